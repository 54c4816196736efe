//! Product, variant and stock management.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::{
    self,
    images::ImageRow,
    products::{ProductFilters, ProductInput, ProductRow, ProductSort},
    variants::{VariantInput, VariantRow},
    Page,
};
use crate::domain::aggregates::{Product, ProductStatus, Variant};
use crate::domain::value_objects::{Money, Sku, Slug};
use crate::i18n::Localized;
use crate::StoreError;

use super::super::middleware::{AdminSession, RequestId};
use super::super::{map_db_error, ApiJson, validate_body, ApiError, ApiResponse, AppState, Paginated};
use super::store_err;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ProductRequest {
    #[validate(length(min = 1, max = 50))]
    pub sku: String,
    #[validate(length(max = 120))]
    pub slug: Option<String>,
    pub name: Localized,
    #[serde(default)]
    pub description: Localized,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub status: Option<ProductStatus>,
    #[serde(default)]
    pub featured: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusRequest {
    pub status: ProductStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct VariantRequest {
    #[validate(length(max = 50))]
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 40))]
    pub size: String,
    #[validate(length(min = 1, max = 40))]
    pub color: String,
    #[validate(range(min = 0, max = 1_000_000))]
    #[serde(default)]
    pub stock: i32,
    pub price_override: Option<Decimal>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub(crate) struct MatrixRequest {
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StockRequest {
    pub delta: i32,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdminProductQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub category_id: Option<Uuid>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Row in the back-office product table. Shows every name translation so
/// missing ones stand out.
#[derive(Debug, Serialize)]
pub(crate) struct AdminProductItem {
    id: Uuid,
    sku: String,
    slug: String,
    name: Localized,
    price: Decimal,
    compare_at_price: Option<Decimal>,
    category_id: Option<Uuid>,
    status: String,
    featured: bool,
    total_stock: i64,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AdminProductDetail {
    #[serde(flatten)]
    product: Product,
    total_stock: u32,
    on_sale: bool,
    images: Vec<ImageRow>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StockResponse {
    variant_id: Uuid,
    stock: i32,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Copies a validated request onto the aggregate. Status changes go through
/// the aggregate so activation enforces the publish rules.
fn apply_request(
    product: &mut Product,
    body: &ProductRequest,
    currency: &str,
) -> Result<(), StoreError> {
    if body.name.de.trim().is_empty() && body.name.en.trim().is_empty() {
        return Err(StoreError::Validation("a German or English name is required".into()));
    }
    let sku = Sku::new(body.sku.as_str()).map_err(|e| StoreError::Validation(e.to_string()))?;
    let slug = match body.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => Slug::from_name(slug),
        None => Slug::from_name_or(&body.name.de, &body.name.en),
    };
    if slug.is_empty() {
        return Err(StoreError::Validation("slug must contain latin letters or digits".into()));
    }
    if body.compare_at_price.is_some_and(|c| c < Decimal::ZERO) {
        return Err(StoreError::Validation("compare-at price must not be negative".into()));
    }

    product.set_sku(sku);
    product.rename(body.name.clone(), slug.as_str());
    product.set_description(body.description.clone());
    product.update_price(
        Money::new(body.price, currency),
        body.compare_at_price.map(|c| Money::new(c, currency)),
    )?;
    product.set_category(body.category_id);
    product.set_featured(body.featured);
    if let Some(status) = body.status {
        if status != product.status() {
            product.set_status(status)?;
        }
    }
    Ok(())
}

fn product_input(product: &Product) -> ProductInput<'_> {
    ProductInput {
        sku: product.sku().as_str(),
        slug: product.slug(),
        name: product.name(),
        description: product.description(),
        price: product.price().amount(),
        compare_at_price: product.compare_at_price().map(Money::amount),
        category_id: product.category_id(),
        status: product.status(),
        featured: product.featured(),
    }
}

async fn currency(state: &AppState, rid: &str) -> Result<String, ApiError> {
    let settings = crate::settings::load(&state.pool)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?;
    Ok(settings.currency)
}

async fn ensure_category(state: &AppState, rid: &str, id: Option<Uuid>) -> Result<(), ApiError> {
    let Some(id) = id else { return Ok(()) };
    db::categories::get_category(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .map(|_| ())
        .ok_or_else(|| ApiError::new(rid, "validation_error", "category does not exist"))
}

async fn load_row(state: &AppState, rid: &str, id: Uuid) -> Result<ProductRow, ApiError> {
    db::products::get_product(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .ok_or_else(|| store_err(rid, StoreError::ProductNotFound))
}

/// Loads the aggregate with its variants.
async fn load_product(state: &AppState, rid: &str, id: Uuid) -> Result<Product, ApiError> {
    let row = load_row(state, rid, id).await?;
    let currency = currency(state, rid).await?;
    let variants = db::variants::list_variants(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?;
    Ok(row.into_product(&currency, variants.into_iter().map(Variant::from).collect()))
}

async fn detail_view(state: &AppState, rid: &str, product: Product) -> Result<AdminProductDetail, ApiError> {
    let images = db::images::list_images(&state.pool, product.id())
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?;
    Ok(AdminProductDetail {
        total_stock: product.total_stock(),
        on_sale: product.on_sale(),
        product,
        images,
    })
}

fn variant_input<'a>(body: &'a VariantRequest, sku: &'a Sku) -> Result<VariantInput<'a>, StoreError> {
    if body.price_override.is_some_and(|p| p <= Decimal::ZERO) {
        return Err(StoreError::Validation("price override must be greater than zero".into()));
    }
    Ok(VariantInput {
        sku: sku.as_str(),
        size: body.size.trim(),
        color: body.color.trim(),
        stock: body.stock,
        price_override: body.price_override,
        active: body.active,
    })
}

/// Explicit SKU, or one derived from the product SKU and the size/color.
fn variant_sku(product_sku: &Sku, body: &VariantRequest) -> Result<Sku, StoreError> {
    let sku = match body.sku.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(sku) => Sku::new(sku),
        None => product_sku.for_variant(&body.size, &body.color),
    };
    sku.map_err(|e| StoreError::Validation(e.to_string()))
}

// ---------------------------------------------------------------------------
// Product handlers
// ---------------------------------------------------------------------------

pub(super) async fn list(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<AdminProductQuery>,
) -> Result<Json<ApiResponse<Paginated<AdminProductItem>>>, ApiError> {
    let rid = &req_id.0;
    let status = match query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(
            ProductStatus::parse(raw)
                .ok_or_else(|| ApiError::new(rid, "validation_error", "unknown product status"))?
                .as_str()
                .to_string(),
        ),
        None => None,
    };
    let filters = ProductFilters {
        status,
        search: query.q,
        category_ids: query.category_id.map(|id| vec![id]),
        sort: ProductSort::parse(query.sort.as_deref()),
        ..ProductFilters::default()
    };
    let page = Page::new(query.page, query.per_page);

    let (rows, total) = db::products::list_products(&state.pool, &filters, page)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let items = rows
        .into_iter()
        .map(|r| AdminProductItem {
            name: r.name(),
            id: r.id,
            sku: r.sku,
            slug: r.slug,
            price: r.price,
            compare_at_price: r.compare_at_price,
            category_id: r.category_id,
            status: r.status,
            featured: r.featured,
            total_stock: r.total_stock,
            image_url: r.image_url,
            created_at: r.created_at,
        })
        .collect();
    Ok(ApiResponse::json(Paginated::new(items, total, page), req_id.0))
}

pub(super) async fn detail(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AdminProductDetail>>, ApiError> {
    let rid = &req_id.0;
    let product = load_product(&state, rid, id).await?;
    let view = detail_view(&state, rid, product).await?;
    Ok(ApiResponse::json(view, req_id.0))
}

pub(super) async fn create(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    ApiJson(body): ApiJson<ProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AdminProductDetail>>), ApiError> {
    let rid = &req_id.0;
    validate_body(rid, &body)?;
    ensure_category(&state, rid, body.category_id).await?;
    let currency = currency(&state, rid).await?;

    let sku = Sku::new(body.sku.as_str()).map_err(|e| store_err(rid, StoreError::Validation(e.to_string())))?;
    let mut product = Product::create(sku, "", body.name.clone(), Money::new(body.price, &currency));
    apply_request(&mut product, &body, &currency).map_err(|e| store_err(rid, e))?;

    db::products::create_product(&state.pool, product.id(), &product_input(&product))
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    tracing::info!(
        username = %admin.username,
        product_id = %product.id(),
        sku = %product.sku(),
        "product created"
    );
    state.bus.publish(product.take_events()).await;

    let view = detail_view(&state, rid, product).await?;
    Ok((StatusCode::CREATED, ApiResponse::json(view, req_id.0)))
}

pub(super) async fn update(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<ProductRequest>,
) -> Result<Json<ApiResponse<AdminProductDetail>>, ApiError> {
    let rid = &req_id.0;
    validate_body(rid, &body)?;
    ensure_category(&state, rid, body.category_id).await?;
    let currency = currency(&state, rid).await?;

    let mut product = load_product(&state, rid, id).await?;
    apply_request(&mut product, &body, &currency).map_err(|e| store_err(rid, e))?;

    db::products::update_product(&state.pool, id, &product_input(&product))
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    tracing::info!(username = %admin.username, product_id = %id, "product updated");
    state.bus.publish(product.take_events()).await;

    let view = detail_view(&state, rid, product).await?;
    Ok(ApiResponse::json(view, req_id.0))
}

/// Products are archived rather than deleted so past orders keep their link.
pub(super) async fn archive(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    db::products::set_product_status(&state.pool, id, ProductStatus::Archived)
        .await
        .map_err(|e| match e {
            db::DbError::NotFound => store_err(&req_id.0, StoreError::ProductNotFound),
            e => map_db_error(req_id.0.clone(), &e),
        })?;
    tracing::info!(username = %admin.username, product_id = %id, "product archived");
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn set_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<StatusRequest>,
) -> Result<Json<ApiResponse<AdminProductDetail>>, ApiError> {
    let rid = &req_id.0;
    let mut product = load_product(&state, rid, id).await?;
    product.set_status(body.status).map_err(|e| store_err(rid, e))?;

    db::products::set_product_status(&state.pool, id, product.status())
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    tracing::info!(
        username = %admin.username,
        product_id = %id,
        status = product.status().as_str(),
        "product status changed"
    );
    state.bus.publish(product.take_events()).await;

    let view = detail_view(&state, rid, product).await?;
    Ok(ApiResponse::json(view, req_id.0))
}

// ---------------------------------------------------------------------------
// Variant handlers
// ---------------------------------------------------------------------------

pub(super) async fn list_variants(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<VariantRow>>>, ApiError> {
    let rid = &req_id.0;
    load_row(&state, rid, product_id).await?;
    let rows = db::variants::list_variants(&state.pool, product_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ApiResponse::json(rows, req_id.0))
}

pub(super) async fn create_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<Uuid>,
    ApiJson(body): ApiJson<VariantRequest>,
) -> Result<(StatusCode, Json<ApiResponse<VariantRow>>), ApiError> {
    let rid = &req_id.0;
    validate_body(rid, &body)?;
    let product = load_row(&state, rid, product_id).await?;

    let sku = variant_sku(&Sku::from_stored(product.sku), &body).map_err(|e| store_err(rid, e))?;
    let input = variant_input(&body, &sku).map_err(|e| store_err(rid, e))?;
    let row = db::variants::create_variant(&state.pool, product_id, &input)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    tracing::info!(product_id = %product_id, sku = %row.sku, "variant created");
    Ok((StatusCode::CREATED, ApiResponse::json(row, req_id.0)))
}

pub(super) async fn generate_matrix(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<Uuid>,
    ApiJson(body): ApiJson<MatrixRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<VariantRow>>>), ApiError> {
    let rid = &req_id.0;
    let product = load_product(&state, rid, product_id).await?;
    let missing = product
        .missing_variants(&body.sizes, &body.colors)
        .map_err(|e| store_err(rid, e))?;

    let rows = db::variants::insert_matrix(&state.pool, product_id, &missing)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    tracing::info!(product_id = %product_id, created = rows.len(), "variant matrix generated");
    Ok((StatusCode::CREATED, ApiResponse::json(rows, req_id.0)))
}

pub(super) async fn update_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<VariantRequest>,
) -> Result<Json<ApiResponse<VariantRow>>, ApiError> {
    let rid = &req_id.0;
    validate_body(rid, &body)?;
    let existing = db::variants::get_variant(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| store_err(rid, StoreError::VariantNotFound))?;
    let product = load_row(&state, rid, existing.product_id).await?;

    let sku = variant_sku(&Sku::from_stored(product.sku), &body).map_err(|e| store_err(rid, e))?;
    let input = variant_input(&body, &sku).map_err(|e| store_err(rid, e))?;
    let row = db::variants::update_variant(&state.pool, id, &input)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ApiResponse::json(row, req_id.0))
}

pub(super) async fn delete_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = db::variants::delete_variant(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    if !deleted {
        return Err(store_err(&req_id.0, StoreError::VariantNotFound));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Manual stock correction. The aggregate checks the delta first; the
/// conditional update guards against a concurrent sale.
pub(super) async fn adjust_stock(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    Path(variant_id): Path<Uuid>,
    ApiJson(body): ApiJson<StockRequest>,
) -> Result<Json<ApiResponse<StockResponse>>, ApiError> {
    let rid = &req_id.0;
    if body.delta == 0 {
        return Err(ApiError::new(rid, "validation_error", "delta must not be zero"));
    }
    let variant = db::variants::get_variant(&state.pool, variant_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| store_err(rid, StoreError::VariantNotFound))?;

    let mut product = load_product(&state, rid, variant.product_id).await?;
    product.adjust_stock(variant_id, body.delta).map_err(|e| {
        store_err(rid, match e {
            crate::domain::aggregates::ProductError::InsufficientInventory => {
                StoreError::InsufficientStock { available: u32::try_from(variant.stock).unwrap_or(0) }
            }
            other => other.into(),
        })
    })?;

    let stock = db::variants::adjust_stock(&state.pool, variant_id, body.delta)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(rid, "conflict", "stock changed concurrently, reload and retry")
        })?;
    tracing::info!(
        username = %admin.username,
        variant_id = %variant_id,
        delta = body.delta,
        stock,
        reason = body.reason.as_deref().unwrap_or(""),
        "stock adjusted"
    );
    state.bus.publish(product.take_events()).await;

    Ok(ApiResponse::json(StockResponse { variant_id, stock }, req_id.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::ProductError;

    fn request(json: serde_json::Value) -> ProductRequest {
        serde_json::from_value(json).unwrap()
    }

    fn draft() -> Product {
        Product::create(
            Sku::new("TMP").unwrap(),
            "",
            Localized::default(),
            Money::eur(Decimal::ONE),
        )
    }

    #[test]
    fn apply_request_derives_slug_from_german_name() {
        let body = request(serde_json::json!({
            "sku": "blz-07",
            "name": { "de": "Leinen Bluse Größe", "en": "Linen blouse", "ar": "بلوزة" },
            "price": "59.90",
            "compare_at_price": "79.90",
            "featured": true
        }));
        let mut product = draft();
        apply_request(&mut product, &body, "EUR").unwrap();
        assert_eq!(product.sku().as_str(), "BLZ-07");
        assert_eq!(product.slug(), "leinen-bluse-groesse");
        assert!(product.on_sale());
        assert!(product.featured());
        assert_eq!(product.status(), ProductStatus::Draft);
    }

    #[test]
    fn apply_request_rejects_arabic_only_name() {
        let body = request(serde_json::json!({
            "sku": "X-1",
            "name": { "ar": "فستان" },
            "price": "10"
        }));
        let err = apply_request(&mut draft(), &body, "EUR").unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn apply_request_enforces_publish_rules() {
        let body = request(serde_json::json!({
            "sku": "X-1",
            "name": { "de": "Kleid" },
            "price": "0"
        }));
        let mut product = draft();
        apply_request(&mut product, &body, "EUR").unwrap();
        assert_eq!(product.price().amount(), Decimal::ZERO);
        assert_eq!(product.status(), ProductStatus::Draft);

        let body = request(serde_json::json!({
            "sku": "X-1",
            "name": { "de": "Kleid" },
            "price": "0",
            "status": "active"
        }));
        let err = apply_request(&mut draft(), &body, "EUR").unwrap_err();
        assert!(matches!(err, StoreError::Validation(ref m) if *m == ProductError::InvalidPrice.to_string()));

        let body = request(serde_json::json!({
            "sku": "X-1",
            "name": { "de": "Kleid" },
            "price": "-5"
        }));
        let err = apply_request(&mut draft(), &body, "EUR").unwrap_err();
        assert!(matches!(err, StoreError::Validation(ref m) if *m == ProductError::NegativePrice.to_string()));

        let body = request(serde_json::json!({
            "sku": "X-1",
            "slug": "Mein Kleid",
            "name": { "de": "Kleid" },
            "price": "25",
            "status": "active"
        }));
        let mut product = draft();
        apply_request(&mut product, &body, "EUR").unwrap();
        assert_eq!(product.status(), ProductStatus::Active);
        assert_eq!(product.slug(), "mein-kleid");
    }

    #[test]
    fn variant_sku_defaults_to_product_sku_with_size_and_color() {
        let body: VariantRequest = serde_json::from_value(serde_json::json!({
            "size": "XL",
            "color": "dark green"
        }))
        .unwrap();
        assert!(body.active);
        let sku = variant_sku(&Sku::new("BLZ-07").unwrap(), &body).unwrap();
        assert_eq!(sku.as_str(), "BLZ-07-XL-DARK-GREEN");

        let input = variant_input(&body, &sku).unwrap();
        assert_eq!(input.stock, 0);
    }

    #[test]
    fn variant_request_rejects_negative_stock() {
        let body: VariantRequest = serde_json::from_value(serde_json::json!({
            "size": "M",
            "color": "Rot",
            "stock": -1
        }))
        .unwrap();
        assert!(body.validate().is_err());
    }
}
