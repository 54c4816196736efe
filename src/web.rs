//! Minimal server-rendered storefront pages.
//!
//! The JSON API is the primary surface; these pages exist so the catalog is
//! crawlable and usable without JavaScript. Markup lives in
//! `templates/storefront/`, where askama escapes every interpolated value.

use askama::Template;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use rust_decimal::Decimal;

use crate::api::catalog::{category_scope, load_categories, ProductCard};
use crate::api::{AppState, RequestLocale};
use crate::db::{self, products::ProductFilters, Page};
use crate::domain::aggregates::{CategoryNode, CategoryTree, Variant};
use crate::i18n::{t, Locale, SUPPORTED_LOCALES};
use crate::settings::SiteSettings;

const PAGE_SIZE: u32 = 24;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/category/:slug", get(category_page))
        .route("/product/:slug", get(product_page))
}

fn price(amount: Decimal, currency: &str) -> String {
    format!("{} {}", amount.round_dp(2), currency)
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Document shell shared by every page: `<html lang dir>`, title and nav.
struct Shell {
    lang: &'static str,
    dir: &'static str,
    title: String,
    shop_name: String,
    home_label: &'static str,
    nav: Vec<NavLink>,
    locales: Vec<&'static str>,
}

impl Shell {
    fn new(locale: Locale, shop_name: &str, title: &str, nav: &[CategoryNode]) -> Self {
        Self {
            lang: locale.as_str(),
            dir: locale.dir(),
            title: title.to_owned(),
            shop_name: shop_name.to_owned(),
            home_label: t(locale, "nav.home"),
            nav: nav
                .iter()
                .map(|n| NavLink { slug: n.slug.clone(), name: n.name.clone() })
                .collect(),
            locales: SUPPORTED_LOCALES.iter().map(|l| l.as_str()).collect(),
        }
    }
}

struct NavLink {
    slug: String,
    name: String,
}

/// A product tile. Empty strings stand for absent image and compare price.
struct CardView {
    slug: String,
    name: String,
    image_url: String,
    price: String,
    compare_at: String,
    sold_out: bool,
}

impl CardView {
    fn new(card: &ProductCard, currency: &str) -> Self {
        Self {
            slug: card.slug.clone(),
            name: card.name.clone(),
            image_url: card.image_url.clone().unwrap_or_default(),
            price: price(card.price, currency),
            compare_at: card
                .compare_at_price
                .filter(|_| card.on_sale)
                .map(|c| price(c, currency))
                .unwrap_or_default(),
            sold_out: !card.in_stock,
        }
    }
}

fn card_views(cards: &[ProductCard], currency: &str) -> Vec<CardView> {
    cards.iter().map(|c| CardView::new(c, currency)).collect()
}

#[derive(Template)]
#[template(path = "storefront/home.html")]
struct HomePage {
    shell: Shell,
    announcement: String,
    heading: &'static str,
    cards: Vec<CardView>,
    sold_out_label: &'static str,
}

#[derive(Template)]
#[template(path = "storefront/category.html")]
struct CategoryPage {
    shell: Shell,
    heading: String,
    cards: Vec<CardView>,
    sold_out_label: &'static str,
}

struct ImageView {
    url: String,
    alt: String,
}

#[derive(Template)]
#[template(path = "storefront/product.html")]
struct ProductPage {
    shell: Shell,
    name: String,
    images: Vec<ImageView>,
    price: String,
    compare_at: String,
    stock_label: &'static str,
    sizes_heading: &'static str,
    sizes: Vec<String>,
    description: String,
}

#[derive(Template)]
#[template(path = "storefront/error.html")]
struct ErrorPage {
    shell: Shell,
    message: &'static str,
}

fn render(locale: Locale, page: &impl Template) -> Result<Html<String>, PageError> {
    page.render().map(Html).map_err(|e| {
        tracing::error!(error = %e, "storefront template failed to render");
        PageError::Internal(locale)
    })
}

enum PageError {
    NotFound(Locale),
    Internal(Locale),
}

impl From<(Locale, db::DbError)> for PageError {
    fn from((locale, e): (Locale, db::DbError)) -> Self {
        tracing::error!(error = %e, "storefront page query failed");
        Self::Internal(locale)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let (status, locale, message) = match self {
            Self::NotFound(locale) => (StatusCode::NOT_FOUND, locale, t(locale, "page.not_found")),
            Self::Internal(locale) => (StatusCode::INTERNAL_SERVER_ERROR, locale, "500"),
        };
        let page = ErrorPage {
            shell: Shell::new(locale, "Modehaus", message, &[]),
            message,
        };
        match page.render() {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "error page failed to render");
                status.into_response()
            }
        }
    }
}

/// Settings and the visible category tree, needed by every page.
async fn page_context(
    state: &AppState,
    locale: Locale,
) -> Result<(SiteSettings, Vec<crate::domain::aggregates::Category>), PageError> {
    let settings = crate::settings::load(&state.pool).await.map_err(|e| (locale, e))?;
    let categories = load_categories(state).await.map_err(|e| (locale, e))?;
    Ok((settings, categories))
}

async fn cards(
    state: &AppState,
    locale: Locale,
    filters: ProductFilters,
) -> Result<Vec<ProductCard>, PageError> {
    let (rows, _) = db::products::list_products(&state.pool, &filters, Page::new(Some(1), Some(PAGE_SIZE)))
        .await
        .map_err(|e| (locale, e))?;
    Ok(rows.into_iter().map(|r| ProductCard::from_row(r, locale)).collect())
}

fn active_filters() -> ProductFilters {
    ProductFilters {
        status: Some("active".to_string()),
        ..ProductFilters::default()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn home(
    State(state): State<AppState>,
    RequestLocale(locale): RequestLocale,
) -> Result<Html<String>, PageError> {
    let (settings, categories) = page_context(&state, locale).await?;
    let featured = cards(
        &state,
        locale,
        ProductFilters {
            featured: Some(true),
            ..active_filters()
        },
    )
    .await?;

    let nav = CategoryTree::new(&categories).build(locale, true);
    let page = HomePage {
        shell: Shell::new(locale, &settings.shop_name, &settings.shop_name, &nav),
        announcement: settings.public(locale).announcement.unwrap_or_default(),
        heading: t(locale, "page.featured"),
        cards: card_views(&featured, &settings.currency),
        sold_out_label: t(locale, "product.out_of_stock"),
    };
    render(locale, &page)
}

async fn category_page(
    State(state): State<AppState>,
    RequestLocale(locale): RequestLocale,
    Path(slug): Path<String>,
) -> Result<Html<String>, PageError> {
    let (settings, categories) = page_context(&state, locale).await?;
    let scope = category_scope(&categories, &slug).ok_or(PageError::NotFound(locale))?;
    let products = cards(
        &state,
        locale,
        ProductFilters {
            category_ids: Some(scope),
            ..active_filters()
        },
    )
    .await?;

    let tree = CategoryTree::new(&categories);
    let title = categories
        .iter()
        .find(|c| c.slug == slug)
        .map(|c| c.name.get(locale).to_string())
        .unwrap_or_default();
    let nav = tree.build(locale, true);
    let page = CategoryPage {
        shell: Shell::new(locale, &settings.shop_name, &title, &nav),
        heading: title,
        cards: card_views(&products, &settings.currency),
        sold_out_label: t(locale, "product.out_of_stock"),
    };
    render(locale, &page)
}

fn size_list(variants: &[Variant]) -> Vec<&str> {
    let mut sizes: Vec<&str> = Vec::new();
    for v in variants.iter().filter(|v| v.active) {
        if !sizes.contains(&v.size.as_str()) {
            sizes.push(&v.size);
        }
    }
    sizes
}

async fn product_page(
    State(state): State<AppState>,
    RequestLocale(locale): RequestLocale,
    Path(slug): Path<String>,
) -> Result<Html<String>, PageError> {
    let (settings, categories) = page_context(&state, locale).await?;
    let row = db::products::get_product_by_slug(&state.pool, &slug)
        .await
        .map_err(|e| (locale, e))?
        .filter(|r| r.status == "active")
        .ok_or(PageError::NotFound(locale))?;
    let product_id = row.id;
    let variants = db::variants::list_variants(&state.pool, product_id)
        .await
        .map_err(|e| (locale, e))?
        .into_iter()
        .map(Variant::from)
        .collect();
    let images = db::images::list_images(&state.pool, product_id)
        .await
        .map_err(|e| (locale, e))?;
    let product = row.into_product(&settings.currency, variants);

    let name = product.name().get(locale);
    let nav = CategoryTree::new(&categories).build(locale, true);
    let page = ProductPage {
        shell: Shell::new(locale, &settings.shop_name, name, &nav),
        name: name.to_owned(),
        images: images
            .iter()
            .map(|i| ImageView {
                url: i.url.clone(),
                alt: i.alt_text.clone().unwrap_or_else(|| name.to_owned()),
            })
            .collect(),
        price: price(product.price().amount(), &settings.currency),
        compare_at: product
            .compare_at_price()
            .filter(|_| product.on_sale())
            .map(|c| price(c.amount(), &settings.currency))
            .unwrap_or_default(),
        stock_label: t(
            locale,
            if product.is_in_stock() { "product.in_stock" } else { "product.out_of_stock" },
        ),
        sizes_heading: t(locale, "page.sizes"),
        sizes: size_list(product.variants()).into_iter().map(str::to_owned).collect(),
        description: product.description().get(locale).to_owned(),
    };
    render(locale, &page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{Quantity, Sku};
    use uuid::Uuid;

    fn card(name: &str, in_stock: bool) -> ProductCard {
        ProductCard {
            id: Uuid::nil(),
            slug: "kleid".into(),
            sku: "K-1".into(),
            name: name.into(),
            price: Decimal::new(4990, 2),
            compare_at_price: Some(Decimal::new(6990, 2)),
            on_sale: true,
            in_stock,
            featured: true,
            image_url: Some("/uploads/products/k.webp".into()),
        }
    }

    #[test]
    fn shell_sets_lang_and_direction() {
        let page = ErrorPage { shell: Shell::new(Locale::Ar, "Modehaus", "فساتين", &[]), message: "404" };
        let html = page.render().unwrap();
        assert!(html.contains("<html lang=\"ar\" dir=\"rtl\">"));
        assert!(html.contains("<title>فساتين | Modehaus</title>"));
        assert!(html.contains("<a href=\"?lang=en\">en</a>"));

        let page = ErrorPage { shell: Shell::new(Locale::De, "Mode <&> Haus", "Start", &[]), message: "404" };
        let html = page.render().unwrap();
        assert!(html.contains("dir=\"ltr\""));
        assert!(html.contains("Mode &lt;&amp;&gt; Haus"));
    }

    #[test]
    fn grid_escapes_names_and_marks_sold_out() {
        let page = CategoryPage {
            shell: Shell::new(Locale::En, "Modehaus", "Dresses", &[]),
            heading: "Dresses".into(),
            cards: card_views(&[card("<b>Kleid</b>", false)], "EUR"),
            sold_out_label: t(Locale::En, "product.out_of_stock"),
        };
        let html = page.render().unwrap();
        assert!(html.contains("&lt;b&gt;Kleid&lt;/b&gt;"));
        assert!(!html.contains("<b>Kleid"));
        assert!(html.contains("<strong>49.90 EUR</strong>"));
        assert!(html.contains("<del>69.90 EUR</del>"));
        assert!(html.contains("Sold out"));
        assert!(html.contains("/product/kleid?lang=en"));
    }

    #[test]
    fn product_text_from_the_catalog_is_escaped() {
        let hostile = r#"<script>alert("x")</script>"#;
        let page = ProductPage {
            shell: Shell::new(Locale::De, "Modehaus", hostile, &[]),
            name: hostile.into(),
            images: vec![ImageView { url: "/uploads/a.webp".into(), alt: r#"" onerror="x"#.into() }],
            price: price(Decimal::new(1000, 2), "EUR"),
            compare_at: String::new(),
            stock_label: t(Locale::De, "product.in_stock"),
            sizes_heading: t(Locale::De, "page.sizes"),
            sizes: vec!["<M>".into()],
            description: "Baumwolle & Leinen <i>weich</i>".into(),
        };
        let html = page.render().unwrap();
        assert!(!html.contains("<script>"));
        assert!(!html.contains(r#"alt="" onerror"#));
        assert!(html.contains("<li>&lt;M&gt;</li>"));
        assert!(html.contains("Baumwolle &amp; Leinen &lt;i&gt;weich&lt;/i&gt;"));
        assert!(!html.contains("<del>"));
    }

    #[test]
    fn size_list_skips_inactive_and_duplicates() {
        let variant = |size: &str, color: &str, active: bool| Variant {
            id: Uuid::new_v4(),
            sku: Sku::from_stored(format!("K-{size}-{color}")),
            size: size.into(),
            color: color.into(),
            stock: Quantity::new(1),
            price_override: None,
            active,
        };
        let variants = vec![
            variant("S", "Rot", true),
            variant("S", "Blau", true),
            variant("M", "Rot", true),
            variant("L", "Rot", false),
        ];
        assert_eq!(size_list(&variants), vec!["S", "M"]);
    }
}
