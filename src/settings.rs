//! Shop-wide settings stored in the `site_settings` key/value table.
//!
//! Missing or unparsable values fall back to their defaults, so a fresh
//! database works without seeding.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;

use crate::db::{self, DbError};
use crate::domain::aggregates::ShippingPolicy;
use crate::domain::value_objects::Email;
use crate::i18n::{Locale, Localized};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteSettings {
    pub shop_name: String,
    pub contact_email: String,
    pub currency: String,
    pub default_locale: Locale,
    pub shipping_flat_rate: Decimal,
    pub free_shipping_threshold: Decimal,
    pub vat_rate: Decimal,
    pub low_stock_threshold: u32,
    pub maintenance_mode: bool,
    pub announcement: Localized,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            shop_name: "Modehaus".to_string(),
            contact_email: "info@modehaus.example".to_string(),
            currency: "EUR".to_string(),
            default_locale: Locale::De,
            shipping_flat_rate: Decimal::new(495, 2),
            free_shipping_threshold: Decimal::new(50, 0),
            vat_rate: Decimal::new(19, 0),
            low_stock_threshold: 3,
            maintenance_mode: false,
            announcement: Localized::default(),
        }
    }
}

/// What the storefront may see, with the announcement already localized.
#[derive(Debug, Clone, Serialize)]
pub struct PublicSettings {
    pub shop_name: String,
    pub contact_email: String,
    pub currency: String,
    pub locale: Locale,
    pub dir: &'static str,
    pub shipping_flat_rate: Decimal,
    pub free_shipping_threshold: Decimal,
    pub vat_rate: Decimal,
    pub maintenance_mode: bool,
    pub announcement: Option<String>,
}

/// Partial update from the admin panel; `None` leaves a value unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub shop_name: Option<String>,
    pub contact_email: Option<String>,
    pub currency: Option<String>,
    pub default_locale: Option<Locale>,
    pub shipping_flat_rate: Option<Decimal>,
    pub free_shipping_threshold: Option<Decimal>,
    pub vat_rate: Option<Decimal>,
    pub low_stock_threshold: Option<u32>,
    pub maintenance_mode: Option<bool>,
    pub announcement: Option<Localized>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("shop name must not be empty")]
    EmptyShopName,
    #[error("contact email is not a valid address")]
    InvalidEmail,
    #[error("currency must be a three-letter ISO code")]
    InvalidCurrency,
    #[error("{0} must not be negative")]
    Negative(&'static str),
    #[error("VAT rate must be between 0 and 100")]
    VatOutOfRange,
}

fn parse_or<T: FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

impl SiteSettings {
    #[must_use]
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let d = Self::default();
        let text = |key: &str, default: String| {
            map.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };
        let announcement = |locale: Locale| {
            map.get(&format!("announcement_{}", locale.as_str()))
                .cloned()
                .unwrap_or_default()
        };

        Self {
            shop_name: text("shop_name", d.shop_name),
            contact_email: text("contact_email", d.contact_email),
            currency: text("currency", d.currency).to_ascii_uppercase(),
            default_locale: map
                .get("default_locale")
                .and_then(|v| Locale::parse(v))
                .unwrap_or(d.default_locale),
            shipping_flat_rate: parse_or(map, "shipping_flat_rate", d.shipping_flat_rate),
            free_shipping_threshold: parse_or(map, "free_shipping_threshold", d.free_shipping_threshold),
            vat_rate: parse_or(map, "vat_rate", d.vat_rate),
            low_stock_threshold: parse_or(map, "low_stock_threshold", d.low_stock_threshold),
            maintenance_mode: parse_or(map, "maintenance_mode", d.maintenance_mode),
            announcement: Localized::new(
                announcement(Locale::De),
                announcement(Locale::En),
                announcement(Locale::Ar),
            ),
        }
    }

    /// Key/value pairs for [`db::settings::upsert_many`].
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("shop_name".into(), self.shop_name.clone()),
            ("contact_email".into(), self.contact_email.clone()),
            ("currency".into(), self.currency.clone()),
            ("default_locale".into(), self.default_locale.as_str().into()),
            ("shipping_flat_rate".into(), self.shipping_flat_rate.to_string()),
            ("free_shipping_threshold".into(), self.free_shipping_threshold.to_string()),
            ("vat_rate".into(), self.vat_rate.to_string()),
            ("low_stock_threshold".into(), self.low_stock_threshold.to_string()),
            ("maintenance_mode".into(), self.maintenance_mode.to_string()),
            ("announcement_de".into(), self.announcement.de.clone()),
            ("announcement_en".into(), self.announcement.en.clone()),
            ("announcement_ar".into(), self.announcement.ar.clone()),
        ]
    }

    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(v) = update.shop_name { self.shop_name = v.trim().to_string(); }
        if let Some(v) = update.contact_email { self.contact_email = v.trim().to_lowercase(); }
        if let Some(v) = update.currency { self.currency = v.trim().to_ascii_uppercase(); }
        if let Some(v) = update.default_locale { self.default_locale = v; }
        if let Some(v) = update.shipping_flat_rate { self.shipping_flat_rate = v; }
        if let Some(v) = update.free_shipping_threshold { self.free_shipping_threshold = v; }
        if let Some(v) = update.vat_rate { self.vat_rate = v; }
        if let Some(v) = update.low_stock_threshold { self.low_stock_threshold = v; }
        if let Some(v) = update.maintenance_mode { self.maintenance_mode = v; }
        if let Some(v) = update.announcement { self.announcement = v; }
    }

    /// # Errors
    ///
    /// Returns the first [`SettingsError`] found.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.shop_name.trim().is_empty() {
            return Err(SettingsError::EmptyShopName);
        }
        Email::parse(&self.contact_email).map_err(|_| SettingsError::InvalidEmail)?;
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(SettingsError::InvalidCurrency);
        }
        if self.shipping_flat_rate < Decimal::ZERO {
            return Err(SettingsError::Negative("shipping_flat_rate"));
        }
        if self.free_shipping_threshold < Decimal::ZERO {
            return Err(SettingsError::Negative("free_shipping_threshold"));
        }
        if self.vat_rate < Decimal::ZERO || self.vat_rate > Decimal::ONE_HUNDRED {
            return Err(SettingsError::VatOutOfRange);
        }
        Ok(())
    }

    #[must_use]
    pub fn shipping_policy(&self) -> ShippingPolicy {
        ShippingPolicy {
            flat_rate: self.shipping_flat_rate,
            free_threshold: self.free_shipping_threshold,
        }
    }

    #[must_use]
    pub fn public(&self, locale: Locale) -> PublicSettings {
        let announcement = self.announcement.get(locale).trim();
        PublicSettings {
            shop_name: self.shop_name.clone(),
            contact_email: self.contact_email.clone(),
            currency: self.currency.clone(),
            locale,
            dir: locale.dir(),
            shipping_flat_rate: self.shipping_flat_rate,
            free_shipping_threshold: self.free_shipping_threshold,
            vat_rate: self.vat_rate,
            maintenance_mode: self.maintenance_mode,
            announcement: (!announcement.is_empty()).then(|| announcement.to_string()),
        }
    }
}

/// Reads the settings table and applies defaults.
///
/// # Errors
///
/// Returns [`DbError`] if the settings cannot be read.
pub async fn load(pool: &PgPool) -> Result<SiteSettings, DbError> {
    let map = db::settings::get_all(pool).await?;
    Ok(SiteSettings::from_map(&map))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn empty_table_yields_defaults() {
        let settings = SiteSettings::from_map(&HashMap::new());
        assert_eq!(settings, SiteSettings::default());
        assert_eq!(settings.shipping_policy().flat_rate, Decimal::new(495, 2));
    }

    #[test]
    fn unparsable_values_fall_back() {
        let settings = SiteSettings::from_map(&map(&[
            ("vat_rate", "neunzehn"),
            ("low_stock_threshold", "-1"),
            ("shipping_flat_rate", "5.90"),
            ("default_locale", "ar-EG"),
            ("maintenance_mode", "true"),
        ]));
        assert_eq!(settings.vat_rate, Decimal::new(19, 0));
        assert_eq!(settings.low_stock_threshold, 3);
        assert_eq!(settings.shipping_flat_rate, Decimal::new(590, 2));
        assert_eq!(settings.default_locale, Locale::Ar);
        assert!(settings.maintenance_mode);
    }

    #[test]
    fn pairs_survive_reload() {
        let mut settings = SiteSettings::default();
        settings.apply(SettingsUpdate {
            shop_name: Some("Boutique Lina".into()),
            announcement: Some(Localized::new("Sale!", "Sale!", "تخفيضات")),
            ..SettingsUpdate::default()
        });
        let pairs: HashMap<String, String> = settings.to_pairs().into_iter().collect();
        assert_eq!(SiteSettings::from_map(&pairs), settings);
    }

    #[test]
    fn validation_rejects_bad_updates() {
        let mut settings = SiteSettings::default();
        settings.apply(SettingsUpdate { contact_email: Some("kein-email".into()), ..Default::default() });
        assert_eq!(settings.validate(), Err(SettingsError::InvalidEmail));

        let mut settings = SiteSettings::default();
        settings.apply(SettingsUpdate { shipping_flat_rate: Some(Decimal::new(-1, 0)), ..Default::default() });
        assert_eq!(settings.validate(), Err(SettingsError::Negative("shipping_flat_rate")));

        let mut settings = SiteSettings::default();
        settings.apply(SettingsUpdate { currency: Some("euro".into()), ..Default::default() });
        assert_eq!(settings.validate(), Err(SettingsError::InvalidCurrency));

        let mut settings = SiteSettings::default();
        settings.apply(SettingsUpdate { vat_rate: Some(Decimal::new(101, 0)), ..Default::default() });
        assert_eq!(settings.validate(), Err(SettingsError::VatOutOfRange));
    }

    #[test]
    fn public_view_localizes_announcement() {
        let mut settings = SiteSettings::default();
        settings.announcement = Localized::new("Gratis Versand", "", "شحن مجاني");
        let en = settings.public(Locale::En);
        assert_eq!(en.announcement.as_deref(), Some("Gratis Versand"));
        let ar = settings.public(Locale::Ar);
        assert_eq!(ar.dir, "rtl");
        assert_eq!(ar.announcement.as_deref(), Some("شحن مجاني"));
        assert!(SiteSettings::default().public(Locale::De).announcement.is_none());
    }
}
