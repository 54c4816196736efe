//! Public catalog endpoints: settings, category tree, product listing,
//! product detail and search suggestions.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Extension, Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{self, products::ProductFilters, products::ProductSort};
use crate::domain::aggregates::{Category, CategoryNode, CategoryTree};
use crate::i18n::{t, Locale};
use crate::settings::PublicSettings;

use super::middleware::RequestId;
use super::{map_db_error, ApiError, ApiResponse, AppState, Paginated, RequestLocale};

const MAX_SUGGESTIONS: i64 = 8;
const MIN_SUGGEST_CHARS: usize = 2;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/settings", get(public_settings))
        .route("/api/v1/categories", get(category_tree))
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/:slug", get(product_detail))
        .route("/api/v1/search/suggest", get(suggest))
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct ProductCard {
    pub id: Uuid,
    pub slug: String,
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub on_sale: bool,
    pub in_stock: bool,
    pub featured: bool,
    pub image_url: Option<String>,
}

impl ProductCard {
    pub(crate) fn from_row(row: db::products::ProductCardRow, locale: Locale) -> Self {
        let name = row.name().get(locale).to_string();
        Self {
            id: row.id,
            on_sale: row.compare_at_price.is_some_and(|c| c > row.price),
            in_stock: row.total_stock > 0,
            slug: row.slug,
            sku: row.sku,
            name,
            price: row.price,
            compare_at_price: row.compare_at_price,
            featured: row.featured,
            image_url: row.image_url,
        }
    }
}

#[derive(Debug, Serialize)]
struct VariantView {
    id: Uuid,
    sku: String,
    size: String,
    color: String,
    price: Decimal,
    stock: u32,
    available: bool,
}

#[derive(Debug, Serialize)]
struct Crumb {
    slug: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct ProductDetail {
    id: Uuid,
    slug: String,
    sku: String,
    name: String,
    description: String,
    currency: String,
    price: Decimal,
    compare_at_price: Option<Decimal>,
    on_sale: bool,
    price_min: Decimal,
    price_max: Decimal,
    in_stock: bool,
    availability: &'static str,
    sizes: Vec<String>,
    colors: Vec<String>,
    variants: Vec<VariantView>,
    images: Vec<db::images::ImageRow>,
    breadcrumb: Vec<Crumb>,
}

#[derive(Debug, Serialize)]
struct Suggestion {
    slug: String,
    name: String,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub(super) struct ProductListQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub featured: Option<bool>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub in_stock: Option<bool>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SuggestQuery {
    pub q: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers shared with the server-rendered pages
// ---------------------------------------------------------------------------

pub(crate) async fn load_categories(state: &AppState) -> Result<Vec<Category>, db::DbError> {
    let rows = db::categories::list_categories(&state.pool).await?;
    Ok(rows.into_iter().map(Category::from).collect())
}

/// Ids of the active category `slug` and everything below it, or `None` when
/// no such category is visible.
pub(crate) fn category_scope(categories: &[Category], slug: &str) -> Option<Vec<Uuid>> {
    let category = categories.iter().find(|c| c.slug == slug && c.active)?;
    let tree = CategoryTree::new(categories);
    let visible = |id: Uuid| tree.breadcrumb(id).iter().all(|c| c.active);
    Some(
        tree.descendant_ids(category.id)
            .into_iter()
            .filter(|id| visible(*id))
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn public_settings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
) -> Result<Json<ApiResponse<PublicSettings>>, ApiError> {
    let settings = crate::settings::load(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::json(settings.public(locale), req_id.0))
}

async fn category_tree(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
) -> Result<Json<ApiResponse<Vec<CategoryNode>>>, ApiError> {
    let categories = load_categories(&state)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let tree = CategoryTree::new(&categories).build(locale, true);
    Ok(ApiResponse::json(tree, req_id.0))
}

async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ApiResponse<Paginated<ProductCard>>>, ApiError> {
    let rid = &req_id.0;
    let page = db::Page::new(query.page, query.per_page);

    let category_ids = match query.category.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => {
            let categories = load_categories(&state)
                .await
                .map_err(|e| map_db_error(rid.clone(), &e))?;
            let ids = category_scope(&categories, slug)
                .ok_or_else(|| ApiError::new(rid, "not_found", "category not found"))?;
            Some(ids)
        }
        None => None,
    };

    let filters = ProductFilters {
        status: Some("active".to_string()),
        search: query.q.clone(),
        category_ids,
        featured: query.featured,
        min_price: query.min_price,
        max_price: query.max_price,
        in_stock_only: query.in_stock.unwrap_or(false),
        sort: ProductSort::parse(query.sort.as_deref()),
    };

    let (rows, total) = db::products::list_products(&state.pool, &filters, page)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let cards = rows.into_iter().map(|r| ProductCard::from_row(r, locale)).collect();

    Ok(ApiResponse::json(Paginated::new(cards, total, page), req_id.0))
}

async fn product_detail(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let rid = &req_id.0;
    let db_err = |e: db::DbError| map_db_error(rid.clone(), &e);

    let row = db::products::get_product_by_slug(&state.pool, &slug)
        .await
        .map_err(db_err)?
        .filter(|r| r.status == "active")
        .ok_or_else(|| ApiError::new(rid, "not_found", t(locale, "page.not_found")))?;

    let settings = crate::settings::load(&state.pool).await.map_err(db_err)?;
    let variants = db::variants::list_variants(&state.pool, row.id)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(Into::into)
        .collect();
    let images = db::images::list_images(&state.pool, row.id).await.map_err(db_err)?;
    let categories = load_categories(&state).await.map_err(db_err)?;

    let product = row.into_product(&settings.currency, variants);
    let tree = CategoryTree::new(&categories);
    let breadcrumb = product
        .category_id()
        .map(|id| tree.breadcrumb(id))
        .unwrap_or_default()
        .into_iter()
        .map(|c| Crumb {
            slug: c.slug.clone(),
            name: c.name.get(locale).to_string(),
        })
        .collect();

    let active: Vec<_> = product.variants().iter().filter(|v| v.active).collect();
    let mut sizes: Vec<String> = Vec::new();
    let mut colors: Vec<String> = Vec::new();
    for v in &active {
        if !sizes.contains(&v.size) {
            sizes.push(v.size.clone());
        }
        if !colors.contains(&v.color) {
            colors.push(v.color.clone());
        }
    }
    let variant_views = active
        .iter()
        .map(|v| VariantView {
            id: v.id,
            sku: v.sku.as_str().to_string(),
            size: v.size.clone(),
            color: v.color.clone(),
            price: product.effective_price(v).amount(),
            stock: v.stock.value(),
            available: !v.stock.is_zero(),
        })
        .collect();

    let (price_min, price_max) = product.price_range();
    let in_stock = product.is_in_stock();
    let detail = ProductDetail {
        id: product.id(),
        slug: product.slug().to_string(),
        sku: product.sku().as_str().to_string(),
        name: product.name().get(locale).to_string(),
        description: product.description().get(locale).to_string(),
        currency: settings.currency.clone(),
        price: product.price().amount(),
        compare_at_price: product.compare_at_price().map(|m| m.amount()),
        on_sale: product.on_sale(),
        price_min,
        price_max,
        in_stock,
        availability: t(locale, if in_stock { "product.in_stock" } else { "product.out_of_stock" }),
        sizes,
        colors,
        variants: variant_views,
        images,
        breadcrumb,
    };

    Ok(ApiResponse::json(detail, req_id.0))
}

async fn suggest(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    Query(query): Query<SuggestQuery>,
) -> Result<Json<ApiResponse<Vec<Suggestion>>>, ApiError> {
    let term = query.q.as_deref().map(str::trim).unwrap_or_default();
    if term.chars().count() < MIN_SUGGEST_CHARS {
        return Ok(ApiResponse::json(Vec::new(), req_id.0));
    }

    let rows = db::products::suggest_products(&state.pool, term, MAX_SUGGESTIONS)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let data = rows
        .into_iter()
        .map(|r| Suggestion {
            name: crate::i18n::Localized::new(r.name_de, r.name_en, r.name_ar)
                .get(locale)
                .to_string(),
            slug: r.slug,
        })
        .collect();

    Ok(ApiResponse::json(data, req_id.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Localized;

    fn category(slug: &str, parent: Option<Uuid>, active: bool) -> Category {
        Category {
            id: Uuid::new_v4(),
            parent_id: parent,
            slug: slug.to_string(),
            name: Localized::new(slug, slug, ""),
            position: 0,
            active,
        }
    }

    #[test]
    fn category_scope_includes_visible_descendants() {
        let damen = category("damen", None, true);
        let kleider = category("kleider", Some(damen.id), true);
        let archiv = category("archiv", Some(damen.id), false);
        let alt = category("alt", Some(archiv.id), true);
        let all = vec![damen.clone(), kleider.clone(), archiv, alt];

        let scope = category_scope(&all, "damen").expect("scope");
        assert_eq!(scope, vec![damen.id, kleider.id]);
        assert!(category_scope(&all, "archiv").is_none());
        assert!(category_scope(&all, "herren").is_none());
    }

    #[test]
    fn product_card_marks_sale_and_stock() {
        let row = db::products::ProductCardRow {
            id: Uuid::new_v4(),
            sku: "MH-1".into(),
            slug: "sommerkleid".into(),
            name_de: "Sommerkleid".into(),
            name_en: "Summer dress".into(),
            name_ar: String::new(),
            price: Decimal::new(4990, 2),
            compare_at_price: Some(Decimal::new(6990, 2)),
            category_id: None,
            status: "active".into(),
            featured: false,
            created_at: chrono::Utc::now(),
            total_stock: 0,
            image_url: None,
        };
        let card = ProductCard::from_row(row, Locale::Ar);
        assert_eq!(card.name, "Sommerkleid");
        assert!(card.on_sale);
        assert!(!card.in_stock);
    }
}
