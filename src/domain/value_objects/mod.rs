//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }

    /// Wraps a SKU read back from storage without re-validating it.
    pub fn from_stored(value: impl Into<String>) -> Self { Self(value.into()) }

    /// Derives a variant SKU such as `DRESS-01-M-NAVY-BLUE`.
    pub fn for_variant(&self, size: &str, color: &str) -> Result<Self, SkuError> {
        let part = |s: &str| s.trim().to_uppercase().split_whitespace().collect::<Vec<_>>().join("-");
        Self::new(format!("{}-{}-{}", self.0, part(size), part(color)))
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum SkuError { Empty, TooLong }
impl std::error::Error for SkuError {}
impl fmt::Display for SkuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "SKU empty"), Self::TooLong => write!(f, "SKU too long") }
    }
}

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn eur(amount: Decimal) -> Self { Self::new(amount, "EUR") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }
    pub fn round(&self) -> Money { Money::new(self.amount.round_dp(2), &self.currency) }
}

impl Default for Money { fn default() -> Self { Self::zero("EUR") } }

#[derive(Debug, Clone)] pub enum MoneyError { CurrencyMismatch }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Currency mismatch") }
}

/// Quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
    pub fn is_zero(&self) -> bool { self.0 == 0 }

    /// Applies a signed delta; `None` if the result would go below zero.
    pub fn apply(&self, delta: i32) -> Option<Self> {
        if delta >= 0 { Some(self.add(delta.unsigned_abs())) } else { self.subtract(delta.unsigned_abs()) }
    }
}

/// URL slug derived from a display name
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slug(String);

impl Slug {
    /// Lowercases, transliterates German umlauts and collapses everything
    /// else that is not ASCII alphanumeric into single dashes.
    pub fn from_name(name: &str) -> Self {
        let mut out = String::with_capacity(name.len());
        let mut dash = false;
        for c in name.trim().to_lowercase().chars() {
            let mapped = match c {
                'ä' => Some("ae"), 'ö' => Some("oe"), 'ü' => Some("ue"), 'ß' => Some("ss"),
                _ => None,
            };
            if let Some(m) = mapped {
                out.push_str(m);
                dash = false;
            } else if c.is_ascii_alphanumeric() {
                out.push(c);
                dash = false;
            } else if !dash && !out.is_empty() {
                out.push('-');
                dash = true;
            }
        }
        Self(out.trim_end_matches('-').to_string())
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Slug of `name`, or of `fallback` when the name has no latin characters.
    pub fn from_name_or(name: &str, fallback: &str) -> Self {
        let slug = Self::from_name(name);
        if slug.is_empty() { Self::from_name(fallback) } else { slug }
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Normalized customer email address
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Email(String);

impl Email {
    pub fn parse(value: &str) -> Result<Self, EmailError> {
        let value = value.trim().to_lowercase();
        let mut parts = value.split('@');
        let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(EmailError);
        };
        if local.is_empty() || value.len() > 254 || value.contains(char::is_whitespace) {
            return Err(EmailError);
        }
        let Some((host, tld)) = domain.rsplit_once('.') else { return Err(EmailError) };
        if host.is_empty() || tld.len() < 2 { return Err(EmailError); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone)] pub struct EmailError;
impl std::error::Error for EmailError {}
impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Invalid email address") }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_sku() { let sku = Sku::new("prod-001").unwrap(); assert_eq!(sku.as_str(), "PROD-001"); }
    #[test]
    fn test_variant_sku() {
        let sku = Sku::new("dress-01").unwrap();
        assert_eq!(sku.for_variant(" m ", "navy blue").unwrap().as_str(), "DRESS-01-M-NAVY-BLUE");
    }
    #[test]
    fn test_money_add() {
        let a = Money::eur(Decimal::new(100, 0));
        let b = Money::eur(Decimal::new(50, 0));
        assert_eq!(a.add(&b).unwrap().amount(), Decimal::new(150, 0));
        assert!(a.add(&Money::new(Decimal::ONE, "USD")).is_err());
    }
    #[test]
    fn test_quantity_apply() {
        let q = Quantity::new(3);
        assert_eq!(q.apply(2), Some(Quantity::new(5)));
        assert_eq!(q.apply(-3), Some(Quantity::new(0)));
        assert_eq!(q.apply(-4), None);
    }
    #[test]
    fn test_slug() {
        assert_eq!(Slug::from_name("Kleider & Röcke").as_str(), "kleider-roecke");
        assert_eq!(Slug::from_name("  Größe XL!! ").as_str(), "groesse-xl");
        assert!(Slug::from_name("فساتين").is_empty());
        assert_eq!(Slug::from_name_or("فساتين", "Dresses").as_str(), "dresses");
    }
    #[test]
    fn test_email() {
        assert_eq!(Email::parse(" Anna@Example.DE ").unwrap().as_str(), "anna@example.de");
        assert!(Email::parse("anna@example").is_err());
        assert!(Email::parse("a@b@c.de").is_err());
        assert!(Email::parse("@example.de").is_err());
    }
}
