//! Checkout, order tracking and newsletter sign-up.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::{self, customers::CustomerInput, orders::CheckoutInput, orders::OrderWriteError};
use crate::domain::aggregates::cart::valid_session_id;
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::Email;
use crate::i18n::{t, Locale};
use crate::StoreError;

use super::middleware::{limit_writes, RateLimitState, RequestId};
use super::{
    map_db_error, map_store_error, validate_body, ApiError, ApiJson, ApiResponse, AppState,
    RequestLocale,
};

pub(super) fn router(rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/orders/:number", get(track_order))
        .route("/api/v1/newsletter/subscribe", post(subscribe))
        .route("/api/v1/newsletter/unsubscribe", post(unsubscribe))
        .route_layer(axum::middleware::from_fn_with_state(rate_limit, limit_writes))
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub(super) struct CheckoutRequest {
    #[validate(length(min = 8, max = 128))]
    pub session_id: String,
    #[validate(length(min = 3, max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub street: String,
    #[validate(length(min = 3, max = 16))]
    pub postal_code: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(equal = 2))]
    pub country: String,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct CheckoutResponse {
    order_number: String,
    status: String,
    subtotal: Decimal,
    shipping: Decimal,
    tax_included: Decimal,
    total: Decimal,
    currency: String,
    message: &'static str,
}

#[derive(Debug, Deserialize)]
pub(super) struct TrackQuery {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
struct TrackedItem {
    product_name: String,
    sku: String,
    size: String,
    color: String,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
}

#[derive(Debug, Serialize)]
struct TrackedStatus {
    status: String,
    at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct TrackedOrder {
    order_number: String,
    status: String,
    payment_status: String,
    placed_at: DateTime<Utc>,
    items: Vec<TrackedItem>,
    subtotal: Decimal,
    shipping: Decimal,
    tax_included: Decimal,
    total: Decimal,
    currency: String,
    history: Vec<TrackedStatus>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SubscribeRequest {
    pub email: String,
    pub locale: Option<Locale>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UnsubscribeRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub(super) struct NewsletterResponse {
    subscribed: bool,
    message: &'static str,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn checkout_error(req_id: &str, locale: Locale, error: OrderWriteError) -> ApiError {
    match error {
        OrderWriteError::InsufficientStock { sku, available } => ApiError::new(
            req_id,
            "conflict",
            format!("{} ({sku}: {available})", t(locale, "stock.insufficient")),
        ),
        OrderWriteError::EmptyCart => ApiError::new(req_id, "validation_error", t(locale, "cart.empty")),
        other => map_store_error(req_id.to_owned(), &StoreError::from(other)),
    }
}

async fn checkout(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    ApiJson(body): ApiJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ApiError> {
    let rid = &req_id.0;
    validate_body(rid, &body)?;
    if !valid_session_id(&body.session_id) {
        return Err(ApiError::new(rid, "validation_error", "invalid session id"));
    }
    let email = Email::parse(&body.email)
        .map_err(|_| ApiError::new(rid, "validation_error", t(locale, "email.invalid")))?;

    let settings = crate::settings::load(&state.pool)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if settings.maintenance_mode {
        return Err(ApiError::new(rid, "maintenance", "the shop is not taking orders right now"));
    }

    let country = body.country.trim().to_ascii_uppercase();
    let input = CheckoutInput {
        session_id: &body.session_id,
        customer: CustomerInput {
            email: email.as_str(),
            first_name: body.first_name.trim(),
            last_name: body.last_name.trim(),
            phone: body.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()),
            street: body.street.trim(),
            postal_code: body.postal_code.trim(),
            city: body.city.trim(),
            country: &country,
            locale: locale.as_str(),
        },
        locale,
        notes: body.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()),
        currency: &settings.currency,
        shipping: settings.shipping_policy(),
        vat_rate: settings.vat_rate,
    };

    let mut order = db::orders::place_order(&state.pool, &input)
        .await
        .map_err(|e| checkout_error(rid, locale, e))?;
    state.bus.publish(order.take_events()).await;

    let totals = order.totals();
    let data = CheckoutResponse {
        order_number: order.order_number().to_string(),
        status: order.status().as_str().to_string(),
        subtotal: totals.subtotal,
        shipping: totals.shipping,
        tax_included: totals.tax_included,
        total: totals.total,
        currency: settings.currency.clone(),
        message: t(locale, "order.placed"),
    };
    Ok((StatusCode::CREATED, ApiResponse::json(data, req_id.0)))
}

async fn track_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    Path(number): Path<String>,
    Query(query): Query<TrackQuery>,
) -> Result<Json<ApiResponse<TrackedOrder>>, ApiError> {
    let rid = &req_id.0;
    let email = query
        .email
        .as_deref()
        .and_then(|e| Email::parse(e).ok())
        .ok_or_else(|| ApiError::new(rid, "validation_error", t(locale, "email.invalid")))?;

    let detail = db::orders::get_order_by_number(&state.pool, &number, email.as_str())
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", "order not found"))?;

    let order = detail.order;
    let data = TrackedOrder {
        order_number: order.order_number,
        status: order.status,
        payment_status: order.payment_status,
        placed_at: order.created_at,
        items: detail
            .items
            .into_iter()
            .map(|i| TrackedItem {
                product_name: i.product_name,
                sku: i.sku,
                size: i.size,
                color: i.color,
                quantity: i.quantity,
                unit_price: i.unit_price,
                line_total: i.line_total,
            })
            .collect(),
        subtotal: order.subtotal,
        shipping: order.shipping,
        tax_included: order.tax_included,
        total: order.total,
        currency: order.currency,
        history: detail
            .history
            .into_iter()
            .map(|h| TrackedStatus {
                status: h.to_status,
                at: h.created_at,
            })
            .collect(),
    };
    Ok(ApiResponse::json(data, req_id.0))
}

async fn subscribe(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    ApiJson(body): ApiJson<SubscribeRequest>,
) -> Result<Json<ApiResponse<NewsletterResponse>>, ApiError> {
    let rid = &req_id.0;
    let email = Email::parse(&body.email)
        .map_err(|_| ApiError::new(rid, "validation_error", t(locale, "email.invalid")))?;
    let locale = body.locale.unwrap_or(locale);

    let outcome = db::newsletter::subscribe(&state.pool, email.as_str(), locale.as_str())
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let message = if outcome.is_new() {
        tracing::info!(?outcome, "newsletter subscription");
        state
            .bus
            .publish(vec![DomainEvent::NewsletterSubscribed {
                email: email.as_str().to_string(),
            }])
            .await;
        t(locale, "newsletter.subscribed")
    } else {
        t(locale, "newsletter.already")
    };

    Ok(ApiResponse::json(
        NewsletterResponse {
            subscribed: true,
            message,
        },
        req_id.0,
    ))
}

async fn unsubscribe(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    RequestLocale(locale): RequestLocale,
    ApiJson(body): ApiJson<UnsubscribeRequest>,
) -> Result<Json<ApiResponse<NewsletterResponse>>, ApiError> {
    let rid = &req_id.0;
    let token = body.token.trim();
    if token.is_empty() {
        return Err(ApiError::new(rid, "validation_error", "token is required"));
    }

    let removed = db::newsletter::unsubscribe(&state.pool, token)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if !removed {
        return Err(ApiError::new(rid, "not_found", "subscription not found"));
    }

    Ok(ApiResponse::json(
        NewsletterResponse {
            subscribed: false,
            message: t(locale, "newsletter.unsubscribed"),
        },
        req_id.0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_errors_are_localized() {
        let err = checkout_error(
            "r",
            Locale::De,
            OrderWriteError::InsufficientStock { sku: "MH-1-M-ROT".into(), available: 1 },
        );
        assert_eq!(err.error.code, "conflict");
        assert!(err.error.message.starts_with("Nicht genügend Bestand"));
        assert!(err.error.message.contains("MH-1-M-ROT: 1"));

        let err = checkout_error("r", Locale::En, OrderWriteError::EmptyCart);
        assert_eq!(err.error.message, "Your cart is empty");

        let err = checkout_error("r", Locale::En, OrderWriteError::NotFound);
        assert_eq!(err.error.code, "not_found");
    }

    #[test]
    fn checkout_request_requires_address() {
        let body: CheckoutRequest = serde_json::from_value(serde_json::json!({
            "session_id": "sess-12345678",
            "email": "lina@example.de",
            "first_name": "Lina",
            "last_name": "Yousef",
            "street": "Königstr. 5",
            "postal_code": "70173",
            "city": "Stuttgart",
            "country": "DE"
        }))
        .unwrap();
        assert!(body.validate().is_ok());

        let mut bad = body;
        bad.country = "DEU".into();
        assert!(bad.validate().is_err());
    }
}
