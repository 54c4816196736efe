//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Sku, Money, Quantity};
use crate::domain::events::DomainEvent;
use crate::i18n::Localized;

#[derive(Clone, Debug, Serialize)]
pub struct Product {
    id: Uuid,
    sku: Sku,
    slug: String,
    name: Localized,
    description: Localized,
    price: Money,
    compare_at_price: Option<Money>,
    category_id: Option<Uuid>,
    status: ProductStatus,
    featured: bool,
    variants: Vec<Variant>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// A size/color combination with its own SKU and stock count.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Variant {
    pub id: Uuid,
    pub sku: Sku,
    pub size: String,
    pub color: String,
    pub stock: Quantity,
    pub price_override: Option<Decimal>,
    pub active: bool,
}

/// A variant to be inserted, produced by [`variant_matrix`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewVariant { pub sku: Sku, pub size: String, pub color: String }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus { #[default] Draft, Active, Archived }

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Draft => "draft", Self::Active => "active", Self::Archived => "archived" }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Some(Self::Draft), "active" => Some(Self::Active), "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Fields needed to rebuild a product from storage.
pub struct ProductParts {
    pub id: Uuid,
    pub sku: Sku,
    pub slug: String,
    pub name: Localized,
    pub description: Localized,
    pub price: Money,
    pub compare_at_price: Option<Money>,
    pub category_id: Option<Uuid>,
    pub status: ProductStatus,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(sku: Sku, slug: impl Into<String>, name: Localized, price: Money) -> Self {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut product = Self {
            id, sku: sku.clone(), slug: slug.into(), name, description: Localized::default(),
            price, compare_at_price: None, category_id: None, status: ProductStatus::Draft,
            featured: false, variants: vec![], created_at: now, updated_at: now, events: vec![],
        };
        product.raise_event(DomainEvent::ProductCreated { product_id: id, sku: sku.to_string() });
        product
    }

    pub fn restore(parts: ProductParts, variants: Vec<Variant>) -> Self {
        Self {
            id: parts.id, sku: parts.sku, slug: parts.slug, name: parts.name, description: parts.description,
            price: parts.price, compare_at_price: parts.compare_at_price, category_id: parts.category_id,
            status: parts.status, featured: parts.featured, variants,
            created_at: parts.created_at, updated_at: parts.updated_at, events: vec![],
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn sku(&self) -> &Sku { &self.sku }
    pub fn slug(&self) -> &str { &self.slug }
    pub fn name(&self) -> &Localized { &self.name }
    pub fn description(&self) -> &Localized { &self.description }
    pub fn price(&self) -> &Money { &self.price }
    pub fn compare_at_price(&self) -> Option<&Money> { self.compare_at_price.as_ref() }
    pub fn category_id(&self) -> Option<Uuid> { self.category_id }
    pub fn status(&self) -> ProductStatus { self.status }
    pub fn featured(&self) -> bool { self.featured }
    pub fn variants(&self) -> &[Variant] { &self.variants }

    pub fn set_description(&mut self, description: Localized) { self.description = description; self.touch(); }
    pub fn set_category(&mut self, category_id: Option<Uuid>) { self.category_id = category_id; self.touch(); }
    pub fn set_featured(&mut self, featured: bool) { self.featured = featured; self.touch(); }
    pub fn set_sku(&mut self, sku: Sku) { self.sku = sku; self.touch(); }

    /// Replaces the display name and its URL slug together.
    pub fn rename(&mut self, name: Localized, slug: impl Into<String>) {
        self.name = name;
        self.slug = slug.into();
        self.touch();
    }

    /// Unit price of a variant: its override, else the product price.
    pub fn effective_price(&self, variant: &Variant) -> Money {
        variant.price_override.map_or_else(|| self.price.clone(), |p| Money::new(p, self.price.currency()))
    }

    pub fn total_stock(&self) -> u32 {
        self.variants.iter().filter(|v| v.active).map(|v| v.stock.value()).sum()
    }

    pub fn is_in_stock(&self) -> bool { self.total_stock() > 0 }

    pub fn on_sale(&self) -> bool {
        self.compare_at_price.as_ref().is_some_and(|c| c.amount() > self.price.amount())
    }

    /// Lowest and highest effective price over active variants, or the base
    /// price when there are none.
    pub fn price_range(&self) -> (Decimal, Decimal) {
        let prices: Vec<Decimal> = self.variants.iter().filter(|v| v.active).map(|v| self.effective_price(v).amount()).collect();
        match (prices.iter().min(), prices.iter().max()) {
            (Some(lo), Some(hi)) => (*lo, *hi),
            _ => (self.price.amount(), self.price.amount()),
        }
    }

    pub fn publish(&mut self) -> Result<(), ProductError> {
        if self.name.de.trim().is_empty() && self.name.en.trim().is_empty() { return Err(ProductError::MissingName); }
        if self.price.amount() <= Decimal::ZERO { return Err(ProductError::InvalidPrice); }
        self.status = ProductStatus::Active;
        self.touch();
        self.raise_event(DomainEvent::ProductPublished { product_id: self.id });
        Ok(())
    }

    pub fn archive(&mut self) { self.status = ProductStatus::Archived; self.touch(); }
    pub fn unpublish(&mut self) { self.status = ProductStatus::Draft; self.touch(); }

    /// Moves the product to `status`, running the publish checks when activating.
    pub fn set_status(&mut self, status: ProductStatus) -> Result<(), ProductError> {
        match status {
            ProductStatus::Active => self.publish(),
            ProductStatus::Draft => { self.unpublish(); Ok(()) }
            ProductStatus::Archived => { self.archive(); Ok(()) }
        }
    }

    /// Drafts may sit at zero while being prepared; [`Product::publish`]
    /// requires a positive price.
    pub fn update_price(&mut self, new_price: Money, compare_at: Option<Money>) -> Result<(), ProductError> {
        if new_price.amount() < Decimal::ZERO { return Err(ProductError::NegativePrice); }
        self.price = new_price;
        self.compare_at_price = compare_at;
        self.touch();
        Ok(())
    }

    /// Applies a stock delta to one variant and returns the new stock.
    pub fn adjust_stock(&mut self, variant_id: Uuid, delta: i32) -> Result<Quantity, ProductError> {
        let variant = self.variants.iter_mut().find(|v| v.id == variant_id).ok_or(ProductError::VariantNotFound)?;
        let stock = variant.stock.apply(delta).ok_or(ProductError::InsufficientInventory)?;
        variant.stock = stock;
        let product_id = self.id;
        self.touch();
        self.raise_event(DomainEvent::StockAdjusted { product_id, variant_id, delta, stock: stock.value() });
        Ok(stock)
    }

    /// Variants still missing from the size × color matrix.
    pub fn missing_variants(&self, sizes: &[String], colors: &[String]) -> Result<Vec<NewVariant>, ProductError> {
        let existing: Vec<(String, String)> = self.variants.iter().map(|v| (v.size.clone(), v.color.clone())).collect();
        variant_matrix(&self.sku, sizes, colors, &existing)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// Builds every size × color combination not already in `existing`.
///
/// Blank entries are dropped and duplicates removed case-insensitively,
/// keeping the first spelling. Output order is sizes-major.
pub fn variant_matrix(
    product_sku: &Sku,
    sizes: &[String],
    colors: &[String],
    existing: &[(String, String)],
) -> Result<Vec<NewVariant>, ProductError> {
    let sizes = dedup_labels(sizes);
    let colors = dedup_labels(colors);
    let taken = |size: &str, color: &str| {
        existing.iter().any(|(s, c)| s.eq_ignore_ascii_case(size) && c.eq_ignore_ascii_case(color))
    };
    let mut out = Vec::with_capacity(sizes.len() * colors.len());
    for size in &sizes {
        for color in &colors {
            if taken(size, color) { continue; }
            let sku = product_sku.for_variant(size, color).map_err(|_| ProductError::InvalidSku)?;
            out.push(NewVariant { sku, size: size.clone(), color: color.clone() });
        }
    }
    Ok(out)
}

fn dedup_labels(labels: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        if !out.iter().any(|o| o.eq_ignore_ascii_case(label)) { out.push(label.to_string()); }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ProductError { MissingName, InvalidPrice, NegativePrice, InvalidSku, VariantNotFound, InsufficientInventory }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingName => write!(f, "Missing name"),
            Self::InvalidPrice => write!(f, "Price must be greater than zero"),
            Self::NegativePrice => write!(f, "Price must not be negative"),
            Self::InvalidSku => write!(f, "Invalid SKU"),
            Self::VariantNotFound => write!(f, "Variant not found"),
            Self::InsufficientInventory => write!(f, "Insufficient inventory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dress() -> Product {
        Product::create(Sku::new("DRESS-01").unwrap(), "sommerkleid", Localized::new("Sommerkleid", "Summer dress", ""), Money::eur(Decimal::new(4999, 2)))
    }

    fn variant(size: &str, color: &str, stock: u32) -> Variant {
        Variant { id: Uuid::new_v4(), sku: Sku::new(format!("D-{size}-{color}")).unwrap(), size: size.into(), color: color.into(), stock: Quantity::new(stock), price_override: None, active: true }
    }

    #[test]
    fn test_product_create() {
        let mut p = dress();
        assert_eq!(p.status(), ProductStatus::Draft);
        assert!(matches!(p.take_events().as_slice(), [DomainEvent::ProductCreated { .. }]));
    }

    #[test]
    fn test_publish_requires_name_and_price() {
        let mut p = Product::create(Sku::new("X").unwrap(), "x", Localized::new("", "", "فستان"), Money::eur(Decimal::ONE));
        assert_eq!(p.publish(), Err(ProductError::MissingName));
        let mut p = Product::create(Sku::new("X").unwrap(), "x", Localized::new("Kleid", "", ""), Money::eur(Decimal::ZERO));
        assert_eq!(p.publish(), Err(ProductError::InvalidPrice));
        let mut p = dress();
        p.publish().unwrap();
        assert_eq!(p.status(), ProductStatus::Active);
    }

    #[test]
    fn test_draft_price_may_be_zero_until_publish() {
        let mut p = dress();
        p.update_price(Money::eur(Decimal::ZERO), None).unwrap();
        assert_eq!(p.price().amount(), Decimal::ZERO);
        assert_eq!(p.status(), ProductStatus::Draft);
        assert_eq!(p.publish(), Err(ProductError::InvalidPrice));
        assert_eq!(p.update_price(Money::eur(Decimal::new(-1, 2)), None), Err(ProductError::NegativePrice));
        assert_eq!(p.price().amount(), Decimal::ZERO);
    }

    #[test]
    fn test_stock_and_prices() {
        let base = dress();
        let mut cheap = variant("S", "Red", 2);
        cheap.price_override = Some(Decimal::new(3999, 2));
        let mut hidden = variant("L", "Red", 10);
        hidden.active = false;
        let p = Product::restore(ProductParts {
            id: base.id(), sku: base.sku().clone(), slug: "sommerkleid".into(), name: base.name().clone(),
            description: Localized::default(), price: base.price().clone(), compare_at_price: Some(Money::eur(Decimal::new(5999, 2))),
            category_id: None, status: ProductStatus::Active, featured: true, created_at: Utc::now(), updated_at: Utc::now(),
        }, vec![cheap.clone(), variant("M", "Red", 3), hidden]);
        assert_eq!(p.total_stock(), 5);
        assert!(p.is_in_stock());
        assert!(p.on_sale());
        assert_eq!(p.effective_price(&cheap).amount(), Decimal::new(3999, 2));
        assert_eq!(p.price_range(), (Decimal::new(3999, 2), Decimal::new(4999, 2)));
    }

    #[test]
    fn test_adjust_stock_never_negative() {
        let v = variant("M", "Blue", 2);
        let id = v.id;
        let mut p = dress();
        p.variants.push(v);
        assert_eq!(p.adjust_stock(id, -2).unwrap().value(), 0);
        assert_eq!(p.adjust_stock(id, -1), Err(ProductError::InsufficientInventory));
        assert_eq!(p.adjust_stock(Uuid::new_v4(), 1), Err(ProductError::VariantNotFound));
    }

    #[test]
    fn test_variant_matrix_skips_existing_and_duplicates() {
        let sku = Sku::new("DRESS-01").unwrap();
        let sizes = vec!["S".to_string(), " m ".to_string(), "s".to_string(), "".to_string()];
        let colors = vec!["Red".to_string(), "Navy Blue".to_string()];
        let existing = vec![("S".to_string(), "red".to_string())];
        let out = variant_matrix(&sku, &sizes, &colors, &existing).unwrap();
        let labels: Vec<(&str, &str)> = out.iter().map(|v| (v.size.as_str(), v.color.as_str())).collect();
        assert_eq!(labels, vec![("S", "Navy Blue"), ("m", "Red"), ("m", "Navy Blue")]);
        assert_eq!(out[0].sku.as_str(), "DRESS-01-S-NAVY-BLUE");
    }
}
