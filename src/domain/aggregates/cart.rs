//! Cart Aggregate

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::order::ShippingPolicy;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug)]
pub struct Cart {
    session_id: String,
    items: Vec<CartItem>,
    subtotal: Money,
    currency: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct CartItem {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub product_slug: String,
    pub name: String,
    pub sku: String,
    pub size: String,
    pub color: String,
    pub quantity: u32,
    pub unit_price: Money,
    /// Units currently available for this variant.
    pub available: u32,
    pub image_url: Option<String>,
}

impl CartItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Debug, Serialize)]
pub struct CartSummary {
    pub session_id: String,
    pub items: Vec<CartItem>,
    pub item_count: u32,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub remaining_for_free_shipping: Decimal,
    pub currency: String,
}

/// Cart session ids come from the browser; keep them to a safe alphabet.
pub fn valid_session_id(session_id: &str) -> bool {
    (8..=128).contains(&session_id.len())
        && session_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl Cart {
    pub fn new(session_id: impl Into<String>, currency: &str) -> Self {
        Self { session_id: session_id.into(), items: vec![], subtotal: Money::zero(currency), currency: currency.to_string() }
    }

    pub fn with_items(session_id: impl Into<String>, currency: &str, items: Vec<CartItem>) -> Self {
        let mut cart = Self::new(session_id, currency);
        cart.items = items;
        cart.recalculate();
        cart
    }

    pub fn session_id(&self) -> &str { &self.session_id }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn item_count(&self) -> u32 { self.items.iter().map(|i| i.quantity).sum() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn quantity_of(&self, variant_id: Uuid) -> u32 {
        self.items.iter().find(|i| i.variant_id == variant_id).map_or(0, |i| i.quantity)
    }

    /// Adds `item`, merging with an existing line for the same variant.
    /// Returns the resulting line quantity.
    pub fn add_item(&mut self, item: CartItem) -> Result<u32, CartError> {
        if item.quantity == 0 { return Err(CartError::InvalidQuantity); }
        let quantity = if let Some(existing) = self.items.iter_mut().find(|i| i.variant_id == item.variant_id) {
            let merged = existing.quantity.saturating_add(item.quantity);
            if merged > existing.available { return Err(CartError::InsufficientStock { available: existing.available }); }
            existing.quantity = merged;
            merged
        } else {
            if item.quantity > item.available { return Err(CartError::InsufficientStock { available: item.available }); }
            let q = item.quantity;
            self.items.push(item);
            q
        };
        self.recalculate();
        Ok(quantity)
    }

    /// Sets a line's quantity; zero removes it.
    pub fn update_quantity(&mut self, variant_id: Uuid, quantity: u32) -> Result<(), CartError> {
        let item = self.items.iter_mut().find(|i| i.variant_id == variant_id).ok_or(CartError::ItemNotFound)?;
        if quantity > item.available { return Err(CartError::InsufficientStock { available: item.available }); }
        if quantity == 0 { self.items.retain(|i| i.variant_id != variant_id); }
        else { item.quantity = quantity; }
        self.recalculate();
        Ok(())
    }

    pub fn remove_item(&mut self, variant_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.variant_id != variant_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.recalculate();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.recalculate(); }

    pub fn summary(&self, shipping: &ShippingPolicy) -> CartSummary {
        let subtotal = self.subtotal.amount();
        let shipping_cost = shipping.shipping_for(subtotal);
        CartSummary {
            session_id: self.session_id.clone(),
            items: self.items.clone(),
            item_count: self.item_count(),
            subtotal,
            shipping: shipping_cost,
            total: subtotal + shipping_cost,
            remaining_for_free_shipping: if self.is_empty() { Decimal::ZERO } else { shipping.remaining_for_free(subtotal) },
            currency: self.currency.clone(),
        }
    }

    fn recalculate(&mut self) {
        self.subtotal = self.items.iter().fold(Money::zero(&self.currency), |acc, i| acc.add(&i.line_total()).unwrap_or(acc));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound, InvalidQuantity, InsufficientStock { available: u32 } }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound => write!(f, "Item not found"),
            Self::InvalidQuantity => write!(f, "Invalid quantity"),
            Self::InsufficientStock { available } => write!(f, "Only {available} left in stock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(variant_id: Uuid, quantity: u32, available: u32) -> CartItem {
        CartItem {
            variant_id, product_id: Uuid::new_v4(), product_slug: "bluse".into(), name: "Bluse".into(), sku: "B-M".into(),
            size: "M".into(), color: "Weiß".into(), quantity, unit_price: Money::eur(Decimal::new(10, 0)), available, image_url: None,
        }
    }

    #[test]
    fn test_cart_operations() {
        let v = Uuid::new_v4();
        let mut cart = Cart::new("sess-12345", "EUR");
        cart.add_item(item(v, 2, 5)).unwrap();
        assert_eq!(cart.subtotal().amount(), Decimal::new(20, 0));
        assert_eq!(cart.add_item(item(v, 1, 5)).unwrap(), 3); // Merged
        assert_eq!(cart.items().len(), 1);
        cart.update_quantity(v, 0).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_cart_respects_stock() {
        let v = Uuid::new_v4();
        let mut cart = Cart::new("sess-12345", "EUR");
        cart.add_item(item(v, 4, 5)).unwrap();
        assert_eq!(cart.add_item(item(v, 2, 5)), Err(CartError::InsufficientStock { available: 5 }));
        assert_eq!(cart.quantity_of(v), 4);
        assert_eq!(cart.update_quantity(v, 6), Err(CartError::InsufficientStock { available: 5 }));
        assert_eq!(cart.add_item(item(Uuid::new_v4(), 0, 5)), Err(CartError::InvalidQuantity));
    }

    #[test]
    fn test_summary_shipping() {
        let policy = ShippingPolicy { flat_rate: Decimal::new(495, 2), free_threshold: Decimal::new(50, 0) };
        let cart = Cart::with_items("sess-12345", "EUR", vec![item(Uuid::new_v4(), 3, 9)]);
        let s = cart.summary(&policy);
        assert_eq!(s.item_count, 3);
        assert_eq!(s.total, Decimal::new(3495, 2));
        assert_eq!(s.remaining_for_free_shipping, Decimal::new(20, 0));
        let empty = Cart::new("sess-12345", "EUR").summary(&policy);
        assert_eq!(empty.shipping, Decimal::ZERO);
        assert_eq!(empty.remaining_for_free_shipping, Decimal::ZERO);
    }

    #[test]
    fn test_session_id_alphabet() {
        assert!(valid_session_id("abcDEF12-_x"));
        assert!(!valid_session_id("short"));
        assert!(!valid_session_id("has space in it"));
    }
}
