//! Session cart and wishlist. Sessions are opaque browser-generated ids; the
//! server only checks their shape.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, put},
    Extension, Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db;
use crate::db::cart::CartWriteError;
use crate::domain::aggregates::cart::valid_session_id;
use crate::domain::aggregates::{Cart, CartError, CartSummary};
use crate::i18n::{t, Locale};
use crate::settings::SiteSettings;

use super::middleware::{limit_writes, RateLimitState, RequestId};
use super::{map_db_error, validate_body, ApiError, ApiJson, ApiResponse, AppState, RequestLocale};

pub(super) fn router(rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/cart/:session", get(get_cart).post(add_item).delete(clear_cart))
        .route(
            "/api/v1/cart/:session/items/:variant_id",
            put(update_item).delete(remove_item),
        )
        .route("/api/v1/wishlist/:session", get(get_wishlist).post(add_to_wishlist))
        .route("/api/v1/wishlist/:session/:product_id", delete(remove_from_wishlist))
        .route_layer(axum::middleware::from_fn_with_state(rate_limit, limit_writes))
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub(super) struct AddItemRequest {
    pub variant_id: Uuid,
    #[validate(range(min = 1, max = 99))]
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize, Validate)]
pub(super) struct UpdateItemRequest {
    #[validate(range(max = 99))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub(super) struct WishlistRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Serialize)]
pub(super) struct CartResponse {
    #[serde(flatten)]
    cart: CartSummary,
    message: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub(super) struct WishlistItem {
    product_id: Uuid,
    slug: String,
    name: String,
    price: Decimal,
    in_stock: bool,
    image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct WishlistResponse {
    items: Vec<WishlistItem>,
    message: Option<&'static str>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_session(req_id: &str, session: &str) -> Result<(), ApiError> {
    if valid_session_id(session) {
        Ok(())
    } else {
        Err(ApiError::new(req_id, "validation_error", "invalid session id"))
    }
}

fn cart_error(req_id: &str, locale: Locale, error: &CartError) -> ApiError {
    match error {
        CartError::InsufficientStock { available } => ApiError::new(
            req_id,
            "conflict",
            format!("{} ({available})", t(locale, "stock.insufficient")),
        ),
        CartError::ItemNotFound => ApiError::new(req_id, "not_found", error.to_string()),
        CartError::InvalidQuantity => ApiError::new(req_id, "validation_error", error.to_string()),
    }
}

fn write_error(req_id: &str, locale: Locale, error: CartWriteError) -> ApiError {
    match error {
        CartWriteError::VariantNotFound => ApiError::new(req_id, "not_found", "variant not found"),
        CartWriteError::Cart(CartError::InsufficientStock { available: 0 }) => {
            ApiError::new(req_id, "conflict", t(locale, "product.out_of_stock"))
        }
        CartWriteError::Cart(e) => cart_error(req_id, locale, &e),
        CartWriteError::Db(e) => map_db_error(req_id.to_owned(), &e),
    }
}

async fn load_cart(
    state: &AppState,
    req_id: &str,
    session: &str,
    locale: Locale,
) -> Result<(Cart, SiteSettings), ApiError> {
    let db_err = |e: db::DbError| map_db_error(req_id.to_owned(), &e);
    let settings = crate::settings::load(&state.pool).await.map_err(db_err)?;
    let lines = db::cart::get_cart_lines(&state.pool, session).await.map_err(db_err)?;
    let items = lines
        .into_iter()
        .map(|l| l.into_item(locale, &settings.currency))
        .collect();
    Ok((Cart::with_items(session, &settings.currency, items), settings))
}

fn respond(
    cart: &Cart,
    settings: &SiteSettings,
    message: Option<&'static str>,
    req_id: String,
) -> Json<ApiResponse<CartResponse>> {
    ApiResponse::json(
        CartResponse {
            cart: cart.summary(&settings.shipping_policy()),
            message,
        },
        req_id,
    )
}

// ---------------------------------------------------------------------------
// Cart handlers
// ---------------------------------------------------------------------------

async fn get_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    Path(session): Path<String>,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    check_session(&req_id.0, &session)?;
    let (cart, settings) = load_cart(&state, &req_id.0, &session, locale).await?;
    let message = cart.is_empty().then(|| t(locale, "cart.empty"));
    Ok(respond(&cart, &settings, message, req_id.0))
}

async fn add_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    Path(session): Path<String>,
    ApiJson(body): ApiJson<AddItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CartResponse>>), ApiError> {
    let rid = &req_id.0;
    check_session(rid, &session)?;
    validate_body(rid, &body)?;

    let settings = crate::settings::load(&state.pool)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let cart = db::cart::change_line(
        &state.pool,
        &session,
        body.variant_id,
        locale,
        &settings.currency,
        |cart, mut item| {
            item.quantity = body.quantity;
            cart.add_item(item).map(|_| ())
        },
    )
    .await
    .map_err(|e| write_error(rid, locale, e))?;
    tracing::debug!(
        session = %session,
        variant_id = %body.variant_id,
        quantity = cart.quantity_of(body.variant_id),
        "cart line added"
    );

    Ok((
        StatusCode::CREATED,
        respond(&cart, &settings, Some(t(locale, "cart.added")), req_id.0),
    ))
}

async fn update_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    Path((session, variant_id)): Path<(String, Uuid)>,
    ApiJson(body): ApiJson<UpdateItemRequest>,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    let rid = &req_id.0;
    check_session(rid, &session)?;
    validate_body(rid, &body)?;

    let settings = crate::settings::load(&state.pool)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let cart = db::cart::change_line(
        &state.pool,
        &session,
        variant_id,
        locale,
        &settings.currency,
        |cart, _| cart.update_quantity(variant_id, body.quantity),
    )
    .await
    .map_err(|e| write_error(rid, locale, e))?;

    let message = if body.quantity == 0 { "cart.removed" } else { "cart.updated" };
    Ok(respond(&cart, &settings, Some(t(locale, message)), req_id.0))
}

async fn remove_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    Path((session, variant_id)): Path<(String, Uuid)>,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    let rid = &req_id.0;
    check_session(rid, &session)?;

    let (mut cart, settings) = load_cart(&state, rid, &session, locale).await?;
    cart.remove_item(variant_id).map_err(|e| cart_error(rid, locale, &e))?;
    db::cart::remove_line(&state.pool, &session, variant_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(respond(&cart, &settings, Some(t(locale, "cart.removed")), req_id.0))
}

async fn clear_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    Path(session): Path<String>,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    let rid = &req_id.0;
    check_session(rid, &session)?;

    let settings = crate::settings::load(&state.pool)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    db::cart::clear_cart(&state.pool, &session)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let cart = Cart::new(session, &settings.currency);
    Ok(respond(&cart, &settings, Some(t(locale, "cart.empty")), req_id.0))
}

// ---------------------------------------------------------------------------
// Wishlist handlers
// ---------------------------------------------------------------------------

async fn wishlist_items(
    state: &AppState,
    req_id: &str,
    session: &str,
    locale: Locale,
) -> Result<Vec<WishlistItem>, ApiError> {
    let rows = db::wishlist::list_wishlist(&state.pool, session)
        .await
        .map_err(|e| map_db_error(req_id.to_owned(), &e))?;
    Ok(rows
        .into_iter()
        .map(|r| WishlistItem {
            name: r.name().get(locale).to_string(),
            product_id: r.product_id,
            slug: r.slug,
            price: r.price,
            in_stock: r.in_stock,
            image_url: r.image_url,
        })
        .collect())
}

async fn get_wishlist(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    Path(session): Path<String>,
) -> Result<Json<ApiResponse<WishlistResponse>>, ApiError> {
    check_session(&req_id.0, &session)?;
    let items = wishlist_items(&state, &req_id.0, &session, locale).await?;
    Ok(ApiResponse::json(WishlistResponse { items, message: None }, req_id.0))
}

async fn add_to_wishlist(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    Path(session): Path<String>,
    ApiJson(body): ApiJson<WishlistRequest>,
) -> Result<Json<ApiResponse<WishlistResponse>>, ApiError> {
    let rid = &req_id.0;
    check_session(rid, &session)?;

    let product = db::products::get_product(&state.pool, body.product_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .filter(|p| p.status == "active");
    if product.is_none() {
        return Err(ApiError::new(rid, "not_found", "product not found"));
    }

    db::wishlist::add_to_wishlist(&state.pool, &session, body.product_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let items = wishlist_items(&state, rid, &session, locale).await?;
    Ok(ApiResponse::json(
        WishlistResponse {
            items,
            message: Some(t(locale, "wishlist.added")),
        },
        req_id.0,
    ))
}

async fn remove_from_wishlist(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    Path((session, product_id)): Path<(String, Uuid)>,
) -> Result<Json<ApiResponse<WishlistResponse>>, ApiError> {
    let rid = &req_id.0;
    check_session(rid, &session)?;

    let removed = db::wishlist::remove_from_wishlist(&state.pool, &session, product_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if !removed {
        return Err(ApiError::new(rid, "not_found", "product is not on the wishlist"));
    }
    let items = wishlist_items(&state, rid, &session, locale).await?;
    Ok(ApiResponse::json(
        WishlistResponse {
            items,
            message: Some(t(locale, "wishlist.removed")),
        },
        req_id.0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_is_localized() {
        let err = cart_error("r", Locale::En, &CartError::InsufficientStock { available: 2 });
        assert_eq!(err.error.code, "conflict");
        assert_eq!(err.error.message, "Not enough stock available (2)");
    }

    #[test]
    fn add_request_defaults_to_one_and_validates_range() {
        let body: AddItemRequest =
            serde_json::from_str(r#"{"variant_id":"00000000-0000-0000-0000-000000000000"}"#).unwrap();
        assert_eq!(body.quantity, 1);
        assert!(body.validate().is_ok());

        let body: AddItemRequest = serde_json::from_str(
            r#"{"variant_id":"00000000-0000-0000-0000-000000000000","quantity":0}"#,
        )
        .unwrap();
        assert!(body.validate().is_err());
    }

    #[test]
    fn session_ids_are_checked() {
        assert!(check_session("r", "abc").is_err());
        assert!(check_session("r", "sess_0123456789").is_ok());
    }
}
