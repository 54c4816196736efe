//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::order::OrderStatus;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    ProductCreated { product_id: Uuid, sku: String },
    ProductPublished { product_id: Uuid },
    StockAdjusted { product_id: Uuid, variant_id: Uuid, delta: i32, stock: u32 },
    OrderPlaced { order_id: Uuid, order_number: String, total: Decimal },
    OrderStatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    NewsletterSubscribed { email: String },
}

impl DomainEvent {
    /// Bus subject, e.g. `modehaus.order_status_changed`.
    pub fn subject(&self) -> String {
        let kind = match self {
            Self::ProductCreated { .. } => "product_created",
            Self::ProductPublished { .. } => "product_published",
            Self::StockAdjusted { .. } => "stock_adjusted",
            Self::OrderPlaced { .. } => "order_placed",
            Self::OrderStatusChanged { .. } => "order_status_changed",
            Self::NewsletterSubscribed { .. } => "newsletter_subscribed",
        };
        format!("modehaus.{kind}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_change_serializes_with_tag() {
        let e = DomainEvent::OrderStatusChanged { order_id: Uuid::nil(), from: OrderStatus::Pending, to: OrderStatus::Shipped };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "order_status_changed");
        assert_eq!(json["to"], "shipped");
        assert_eq!(e.subject(), "modehaus.order_status_changed");
    }
}
