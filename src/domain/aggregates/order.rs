//! Order Aggregate
//!
//! Status changes go through [`OrderStatus::can_transition_to`]; every accepted
//! change yields a history entry and, for cancellations and refunds, the stock
//! to hand back to each variant.

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Money;
use crate::domain::events::DomainEvent;

#[derive(Clone, Debug)]
pub struct Order {
    id: Uuid,
    order_number: String,
    email: String,
    status: OrderStatus,
    payment: PaymentStatus,
    items: Vec<LineItem>,
    totals: OrderTotals,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LineItem { pub variant_id: Option<Uuid>, pub product_name: String, pub sku: String, pub size: String, pub color: String, pub quantity: u32, pub unit_price: Money }

impl LineItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Shipped, Delivered, Cancelled, Refunded }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus { #[default] Pending, Paid, Refunded }

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [Self::Pending, Self::Confirmed, Self::Processing, Self::Shipped, Self::Delivered, Self::Cancelled, Self::Refunded];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Confirmed => "confirmed", Self::Processing => "processing",
            Self::Shipped => "shipped", Self::Delivered => "delivered", Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed | Processing | Cancelled)
                | (Confirmed, Processing | Cancelled)
                | (Processing, Shipped | Cancelled)
                | (Shipped, Delivered)
                | (Delivered, Refunded)
        )
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Cancelled | Self::Refunded) }

    /// Whether entering this status hands the ordered quantities back to stock.
    pub fn releases_stock(&self) -> bool { matches!(self, Self::Cancelled | Self::Refunded) }

    pub fn next_statuses(&self) -> Vec<OrderStatus> {
        Self::ALL.into_iter().filter(|s| self.can_transition_to(*s)).collect()
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Paid => "paid", Self::Refunded => "refunded" }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending), "paid" => Some(Self::Paid), "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Shipping rules taken from site settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShippingPolicy { pub flat_rate: Decimal, pub free_threshold: Decimal }

impl ShippingPolicy {
    pub fn shipping_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal <= Decimal::ZERO || subtotal >= self.free_threshold { Decimal::ZERO } else { self.flat_rate }
    }
    /// How much more the customer has to spend for free shipping.
    pub fn remaining_for_free(&self, subtotal: Decimal) -> Decimal { (self.free_threshold - subtotal).max(Decimal::ZERO) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OrderTotals { pub subtotal: Decimal, pub shipping: Decimal, pub total: Decimal, pub tax_included: Decimal }

impl OrderTotals {
    /// Prices are gross: the VAT share is extracted from the total.
    pub fn compute(items: &[LineItem], shipping: &ShippingPolicy, vat_rate: Decimal) -> Self {
        let subtotal: Decimal = items.iter().map(|i| i.line_total().amount()).sum();
        let shipping = shipping.shipping_for(subtotal);
        let total = subtotal + shipping;
        let tax_included = if vat_rate > Decimal::ZERO {
            (total * vat_rate / (Decimal::ONE_HUNDRED + vat_rate)).round_dp(2)
        } else {
            Decimal::ZERO
        };
        Self { subtotal: subtotal.round_dp(2), shipping, total: total.round_dp(2), tax_included }
    }
}

/// One row of the status log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderHistoryEntry { pub from_status: Option<OrderStatus>, pub to_status: OrderStatus, pub note: Option<String>, pub created_at: DateTime<Utc> }

/// Everything a status change has to persist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange { pub entry: OrderHistoryEntry, pub payment: PaymentStatus, pub restock: Vec<(Uuid, u32)> }

/// `MH-YYYYMMDD-XXXXXX`
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng().sample_iter(&Alphanumeric).take(6).map(|b| char::from(b).to_ascii_uppercase()).collect();
    format!("MH-{}-{}", now.format("%Y%m%d"), suffix)
}

impl Order {
    pub fn place(email: impl Into<String>, items: Vec<LineItem>, shipping: &ShippingPolicy, vat_rate: Decimal) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        if items.iter().any(|i| i.quantity == 0) { return Err(OrderError::InvalidQuantity); }
        let now = Utc::now();
        let totals = OrderTotals::compute(&items, shipping, vat_rate);
        let mut order = Self {
            id: Uuid::now_v7(), order_number: generate_order_number(now), email: email.into(),
            status: OrderStatus::Pending, payment: PaymentStatus::Pending, items, totals,
            updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::OrderPlaced { order_id: order.id, order_number: order.order_number.clone(), total: order.totals.total });
        Ok(order)
    }

    pub fn restore(id: Uuid, order_number: String, email: String, status: OrderStatus, payment: PaymentStatus, items: Vec<LineItem>, totals: OrderTotals) -> Self {
        Self { id, order_number, email, status, payment, items, totals, updated_at: Utc::now(), events: vec![] }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn email(&self) -> &str { &self.email }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment(&self) -> PaymentStatus { self.payment }
    pub fn totals(&self) -> &OrderTotals { &self.totals }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// The first history row, written together with the order.
    pub fn opening_entry(&self) -> OrderHistoryEntry {
        OrderHistoryEntry { from_status: None, to_status: self.status, note: None, created_at: self.updated_at }
    }

    pub fn transition(&mut self, to: OrderStatus, note: Option<String>) -> Result<StatusChange, OrderError> {
        let from = self.status;
        if !from.can_transition_to(to) { return Err(OrderError::InvalidTransition { from, to }); }
        self.status = to;
        if to == OrderStatus::Refunded { self.payment = PaymentStatus::Refunded; }
        let restock = if to.releases_stock() {
            self.items.iter().filter_map(|i| i.variant_id.map(|v| (v, i.quantity))).collect()
        } else {
            vec![]
        };
        self.touch();
        self.raise_event(DomainEvent::OrderStatusChanged { order_id: self.id, from, to });
        Ok(StatusChange {
            entry: OrderHistoryEntry { from_status: Some(from), to_status: to, note, created_at: self.updated_at },
            payment: self.payment,
            restock,
        })
    }

    pub fn mark_paid(&mut self) { self.payment = PaymentStatus::Paid; self.touch(); }

    /// Records the payment and moves to `to`. A payment cannot arrive with a
    /// cancellation or refund, and nothing changes when the move is refused.
    pub fn pay_and_transition(&mut self, to: OrderStatus, note: Option<String>) -> Result<StatusChange, OrderError> {
        if to.is_terminal() { return Err(OrderError::PaymentOnClosedOrder { to }); }
        if !self.status.can_transition_to(to) { return Err(OrderError::InvalidTransition { from: self.status, to }); }
        self.mark_paid();
        self.transition(to, note)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { NoItems, InvalidQuantity, InvalidTransition { from: OrderStatus, to: OrderStatus }, PaymentOnClosedOrder { to: OrderStatus } }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "No items"),
            Self::InvalidQuantity => write!(f, "Invalid quantity"),
            Self::InvalidTransition { from, to } => write!(f, "Cannot change order status from {from} to {to}"),
            Self::PaymentOnClosedOrder { to } => write!(f, "Cannot mark an order paid while moving it to {to}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ShippingPolicy { ShippingPolicy { flat_rate: Decimal::new(495, 2), free_threshold: Decimal::new(50, 0) } }

    fn item(variant: Uuid, qty: u32, cents: i64) -> LineItem {
        LineItem { variant_id: Some(variant), product_name: "Bluse".into(), sku: "B-M-RED".into(), size: "M".into(), color: "Red".into(), quantity: qty, unit_price: Money::eur(Decimal::new(cents, 2)) }
    }

    #[test]
    fn test_order_workflow() {
        let mut order = Order::place("anna@example.de", vec![item(Uuid::new_v4(), 2, 1000)], &policy(), Decimal::new(19, 0)).unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert!(order.transition(OrderStatus::Confirmed, None).unwrap().restock.is_empty());
        order.mark_paid();
        order.transition(OrderStatus::Processing, None).unwrap();
        order.transition(OrderStatus::Shipped, Some("DHL 123".into())).unwrap();
        assert_eq!(order.status(), OrderStatus::Shipped);
        assert_eq!(order.take_events().len(), 4);
    }

    #[test]
    fn test_rejects_invalid_transitions() {
        let mut order = Order::place("a@b.de", vec![item(Uuid::new_v4(), 1, 1000)], &policy(), Decimal::ZERO).unwrap();
        let err = order.transition(OrderStatus::Delivered, None).unwrap_err();
        assert_eq!(err, OrderError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Delivered });
        order.transition(OrderStatus::Cancelled, None).unwrap();
        assert!(OrderStatus::Cancelled.next_statuses().is_empty());
        assert!(order.transition(OrderStatus::Pending, None).is_err());
    }

    #[test]
    fn test_payment_cannot_ride_along_with_cancellation() {
        let mut order = Order::place("a@b.de", vec![item(Uuid::new_v4(), 1, 1000)], &policy(), Decimal::ZERO).unwrap();
        let err = order.pay_and_transition(OrderStatus::Cancelled, None).unwrap_err();
        assert_eq!(err, OrderError::PaymentOnClosedOrder { to: OrderStatus::Cancelled });
        assert_eq!(order.payment(), PaymentStatus::Pending);
        assert_eq!(order.status(), OrderStatus::Pending);

        let err = order.pay_and_transition(OrderStatus::Shipped, None).unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
        assert_eq!(order.payment(), PaymentStatus::Pending);

        let change = order.pay_and_transition(OrderStatus::Confirmed, None).unwrap();
        assert_eq!(change.payment, PaymentStatus::Paid);
        assert_eq!(order.status(), OrderStatus::Confirmed);
    }

    #[test]
    fn test_cancel_and_refund_release_stock() {
        let v = Uuid::new_v4();
        let mut order = Order::place("a@b.de", vec![item(v, 3, 1000)], &policy(), Decimal::ZERO).unwrap();
        let change = order.transition(OrderStatus::Cancelled, Some("customer request".into())).unwrap();
        assert_eq!(change.restock, vec![(v, 3)]);
        assert_eq!(change.entry.from_status, Some(OrderStatus::Pending));

        let mut order = Order::restore(Uuid::new_v4(), "MH-1".into(), "a@b.de".into(), OrderStatus::Delivered, PaymentStatus::Paid, vec![item(v, 1, 1000)], OrderTotals::default());
        let change = order.transition(OrderStatus::Refunded, None).unwrap();
        assert_eq!(change.payment, PaymentStatus::Refunded);
        assert_eq!(change.restock, vec![(v, 1)]);
    }

    #[test]
    fn test_totals_include_shipping_below_threshold() {
        let totals = OrderTotals::compute(&[item(Uuid::new_v4(), 2, 1000)], &policy(), Decimal::new(19, 0));
        assert_eq!(totals.subtotal, Decimal::new(20, 0));
        assert_eq!(totals.shipping, Decimal::new(495, 2));
        assert_eq!(totals.total, Decimal::new(2495, 2));
        assert_eq!(totals.tax_included, Decimal::new(398, 2));

        let free = OrderTotals::compute(&[item(Uuid::new_v4(), 5, 1000)], &policy(), Decimal::ZERO);
        assert_eq!(free.shipping, Decimal::ZERO);
        assert_eq!(free.tax_included, Decimal::ZERO);
    }

    #[test]
    fn test_order_number_format() {
        let n = generate_order_number(Utc::now());
        assert_eq!(n.len(), "MH-20240101-ABCDEF".len());
        assert!(n.starts_with("MH-"));
        assert!(n[12..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_place_requires_items() {
        assert_eq!(Order::place("a@b.de", vec![], &policy(), Decimal::ZERO).unwrap_err(), OrderError::NoItems);
        assert_eq!(OrderStatus::parse(" Shipped "), Some(OrderStatus::Shipped));
        assert_eq!(OrderStatus::parse("lost"), None);
    }
}
