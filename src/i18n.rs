//! Storefront localization: German (default), English and Arabic.
//!
//! Translatable catalog text is stored as one column per locale and carried
//! around as [`Localized`]. Short user-facing API messages go through [`t`].

use serde::{Deserialize, Serialize};

/// Supported storefront locales.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    De,
    En,
    Ar,
}

pub const SUPPORTED_LOCALES: &[Locale] = &[Locale::De, Locale::En, Locale::Ar];

impl Locale {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::De => "de",
            Self::En => "en",
            Self::Ar => "ar",
        }
    }

    /// Parses a locale tag, case-insensitive and tolerant of region suffixes
    /// (`en-GB`, `ar_EG`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.split(['-', '_']).next().unwrap_or("") {
            "de" => Some(Self::De),
            "en" => Some(Self::En),
            "ar" => Some(Self::Ar),
            _ => None,
        }
    }

    /// Resolves the request locale from an explicit `lang` value, then the
    /// `Accept-Language` header (in listed order, quality values ignored),
    /// then `fallback`.
    #[must_use]
    pub fn from_request(lang: Option<&str>, accept_language: Option<&str>, fallback: Self) -> Self {
        if let Some(locale) = lang.and_then(Self::parse) {
            return locale;
        }
        accept_language
            .into_iter()
            .flat_map(|header| header.split(','))
            .filter_map(|part| Self::parse(part.split(';').next().unwrap_or("")))
            .next()
            .unwrap_or(fallback)
    }

    /// Text direction for the `dir` HTML attribute.
    #[must_use]
    pub const fn dir(self) -> &'static str {
        match self {
            Self::Ar => "rtl",
            Self::De | Self::En => "ltr",
        }
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A piece of catalog text in every supported locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localized {
    #[serde(default)]
    pub de: String,
    #[serde(default)]
    pub en: String,
    #[serde(default)]
    pub ar: String,
}

impl Localized {
    pub fn new(de: impl Into<String>, en: impl Into<String>, ar: impl Into<String>) -> Self {
        Self { de: de.into(), en: en.into(), ar: ar.into() }
    }

    /// Returns the text for `locale`, falling back to German and then English
    /// when the translation is blank.
    #[must_use]
    pub fn get(&self, locale: Locale) -> &str {
        let wanted = match locale {
            Locale::De => &self.de,
            Locale::En => &self.en,
            Locale::Ar => &self.ar,
        };
        [wanted, &self.de, &self.en]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .map_or("", String::as_str)
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.de.trim().is_empty() && self.en.trim().is_empty() && self.ar.trim().is_empty()
    }

    /// First non-blank translation, preferring latin-script locales. Used for slugs.
    #[must_use]
    pub fn primary(&self) -> &str {
        self.get(Locale::De)
    }
}

/// Looks up a storefront message. Unknown keys fall back to German and then to
/// the key itself.
#[must_use]
pub fn t(locale: Locale, key: &'static str) -> &'static str {
    lookup(locale, key)
        .or_else(|| lookup(Locale::De, key))
        .unwrap_or(key)
}

fn lookup(locale: Locale, key: &str) -> Option<&'static str> {
    let msg = match (key, locale) {
        ("cart.added", Locale::De) => "Artikel wurde in den Warenkorb gelegt",
        ("cart.added", Locale::En) => "Item added to cart",
        ("cart.added", Locale::Ar) => "تمت إضافة المنتج إلى سلة التسوق",
        ("cart.updated", Locale::De) => "Warenkorb aktualisiert",
        ("cart.updated", Locale::En) => "Cart updated",
        ("cart.updated", Locale::Ar) => "تم تحديث سلة التسوق",
        ("cart.removed", Locale::De) => "Artikel entfernt",
        ("cart.removed", Locale::En) => "Item removed",
        ("cart.removed", Locale::Ar) => "تمت إزالة المنتج",
        ("cart.empty", Locale::De) => "Ihr Warenkorb ist leer",
        ("cart.empty", Locale::En) => "Your cart is empty",
        ("cart.empty", Locale::Ar) => "سلة التسوق فارغة",
        ("stock.insufficient", Locale::De) => "Nicht genügend Bestand verfügbar",
        ("stock.insufficient", Locale::En) => "Not enough stock available",
        ("stock.insufficient", Locale::Ar) => "الكمية المتوفرة غير كافية",
        ("wishlist.added", Locale::De) => "Zur Wunschliste hinzugefügt",
        ("wishlist.added", Locale::En) => "Added to wishlist",
        ("wishlist.added", Locale::Ar) => "تمت الإضافة إلى قائمة الأمنيات",
        ("wishlist.removed", Locale::De) => "Von der Wunschliste entfernt",
        ("wishlist.removed", Locale::En) => "Removed from wishlist",
        ("wishlist.removed", Locale::Ar) => "تمت الإزالة من قائمة الأمنيات",
        ("newsletter.subscribed", Locale::De) => "Vielen Dank für Ihre Anmeldung",
        ("newsletter.subscribed", Locale::En) => "Thank you for subscribing",
        ("newsletter.subscribed", Locale::Ar) => "شكراً لاشتراكك",
        ("newsletter.already", Locale::De) => "Sie sind bereits angemeldet",
        ("newsletter.already", Locale::En) => "You are already subscribed",
        ("newsletter.already", Locale::Ar) => "أنت مشترك بالفعل",
        ("newsletter.unsubscribed", Locale::De) => "Sie wurden abgemeldet",
        ("newsletter.unsubscribed", Locale::En) => "You have been unsubscribed",
        ("newsletter.unsubscribed", Locale::Ar) => "تم إلغاء اشتراكك",
        ("order.placed", Locale::De) => "Vielen Dank für Ihre Bestellung",
        ("order.placed", Locale::En) => "Thank you for your order",
        ("order.placed", Locale::Ar) => "شكراً لطلبك",
        ("email.invalid", Locale::De) => "Bitte geben Sie eine gültige E-Mail-Adresse ein",
        ("email.invalid", Locale::En) => "Please enter a valid email address",
        ("email.invalid", Locale::Ar) => "يرجى إدخال بريد إلكتروني صالح",
        ("product.out_of_stock", Locale::De) => "Ausverkauft",
        ("product.out_of_stock", Locale::En) => "Sold out",
        ("product.out_of_stock", Locale::Ar) => "نفدت الكمية",
        ("product.in_stock", Locale::De) => "Auf Lager",
        ("product.in_stock", Locale::En) => "In stock",
        ("product.in_stock", Locale::Ar) => "متوفر",
        ("nav.home", Locale::De) => "Startseite",
        ("nav.home", Locale::En) => "Home",
        ("nav.home", Locale::Ar) => "الرئيسية",
        ("page.featured", Locale::De) => "Empfehlungen",
        ("page.featured", Locale::En) => "Featured",
        ("page.featured", Locale::Ar) => "منتجات مميزة",
        ("page.not_found", Locale::De) => "Seite nicht gefunden",
        ("page.not_found", Locale::En) => "Page not found",
        ("page.not_found", Locale::Ar) => "الصفحة غير موجودة",
        ("page.sizes", Locale::De) => "Größen",
        ("page.sizes", Locale::En) => "Sizes",
        ("page.sizes", Locale::Ar) => "المقاسات",
        _ => return None,
    };
    Some(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_region_tags() {
        assert_eq!(Locale::parse("en-GB"), Some(Locale::En));
        assert_eq!(Locale::parse("AR_eg"), Some(Locale::Ar));
        assert_eq!(Locale::parse("fr"), None);
        assert_eq!(Locale::parse(""), None);
    }

    #[test]
    fn from_request_prefers_explicit_lang() {
        let locale = Locale::from_request(Some("ar"), Some("en-US,en;q=0.9"), Locale::De);
        assert_eq!(locale, Locale::Ar);
    }

    #[test]
    fn from_request_uses_first_supported_accept_language() {
        let locale = Locale::from_request(None, Some("fr-FR, en;q=0.8, de;q=0.5"), Locale::De);
        assert_eq!(locale, Locale::En);
        assert_eq!(Locale::from_request(Some("xx"), Some("fr"), Locale::De), Locale::De);
    }

    #[test]
    fn arabic_is_right_to_left() {
        assert_eq!(Locale::Ar.dir(), "rtl");
        assert_eq!(Locale::De.dir(), "ltr");
    }

    #[test]
    fn localized_falls_back_to_german_then_english() {
        let text = Localized::new("Kleid", "Dress", "");
        assert_eq!(text.get(Locale::Ar), "Kleid");
        let text = Localized::new(" ", "Dress", "");
        assert_eq!(text.get(Locale::Ar), "Dress");
        assert_eq!(Localized::default().get(Locale::En), "");
    }

    #[test]
    fn message_catalog_falls_back_to_key() {
        assert_eq!(t(Locale::En, "cart.added"), "Item added to cart");
        assert_eq!(t(Locale::Ar, "no.such.key"), "no.such.key");
    }
}
