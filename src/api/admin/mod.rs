//! Back-office JSON API under `/api/v1/admin`. Everything except login sits
//! behind [`require_admin`].

mod categories;
mod customers;
mod images;
mod newsletter;
mod orders;
mod products;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::config::{AdminCredentials, Environment};
use crate::db::{self, admin_sessions::sha256_hex, dashboard::DashboardStats};
use crate::settings::{SettingsUpdate, SiteSettings};
use crate::StoreError;

use super::middleware::{
    clear_session_cookie, limit_writes, require_admin, session_cookie, session_token, AdminSession,
    RateLimitState, RequestId,
};
use super::{map_db_error, map_store_error, ApiError, ApiJson, ApiResponse, AppState};

const RECENT_ORDERS: i64 = 10;
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub(super) fn router(state: AppState, rate_limit: RateLimitState) -> Router<AppState> {
    let upload_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    let uploads = Router::new()
        .route(
            "/api/v1/admin/products/:id/images",
            get(images::list).post(images::upload),
        )
        .layer(DefaultBodyLimit::max(upload_limit));

    let protected = Router::new()
        .route("/api/v1/admin/logout", post(logout))
        .route("/api/v1/admin/dashboard", get(dashboard))
        .route("/api/v1/admin/products", get(products::list).post(products::create))
        .route(
            "/api/v1/admin/products/:id",
            get(products::detail).put(products::update).delete(products::archive),
        )
        .route("/api/v1/admin/products/:id/status", post(products::set_status))
        .route(
            "/api/v1/admin/products/:id/variants",
            get(products::list_variants).post(products::create_variant),
        )
        .route("/api/v1/admin/products/:id/variants/matrix", post(products::generate_matrix))
        .route(
            "/api/v1/admin/variants/:id",
            put(products::update_variant).delete(products::delete_variant),
        )
        .route("/api/v1/admin/variants/:id/stock", post(products::adjust_stock))
        .route("/api/v1/admin/products/:id/images/order", put(images::reorder))
        .route("/api/v1/admin/images/:id/primary", put(images::set_primary))
        .route("/api/v1/admin/images/:id", delete(images::remove))
        .route("/api/v1/admin/categories", get(categories::list).post(categories::create))
        .route(
            "/api/v1/admin/categories/:id",
            get(categories::detail).put(categories::update).delete(categories::remove),
        )
        .route("/api/v1/admin/orders", get(orders::list))
        .route("/api/v1/admin/orders/:id", get(orders::detail))
        .route("/api/v1/admin/orders/:id/status", post(orders::change_status))
        .route("/api/v1/admin/customers", get(customers::list))
        .route(
            "/api/v1/admin/customers/:id",
            get(customers::detail).put(customers::update),
        )
        .route("/api/v1/admin/newsletter", get(newsletter::list))
        .route("/api/v1/admin/newsletter/:id", delete(newsletter::remove))
        .route("/api/v1/admin/settings", get(get_settings).put(put_settings))
        .merge(uploads)
        .route_layer(axum::middleware::from_fn_with_state(state, require_admin));

    Router::new()
        .route("/api/v1/admin/login", post(login))
        .route_layer(axum::middleware::from_fn_with_state(rate_limit, limit_writes))
        .merge(protected)
}

fn store_err(req_id: &str, e: impl Into<StoreError>) -> ApiError {
    map_store_error(req_id.to_owned(), &e.into())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub(super) struct LoginResponse {
    token: String,
    username: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct LogoutResponse {
    logged_out: bool,
}

/// Username and `sha256(salt:password)` compared in constant time.
fn credentials_match(admin: &AdminCredentials, username: &str, password: &str) -> bool {
    let hash = sha256_hex(format!("{}:{password}", admin.salt).as_bytes());
    let user_ok = username.trim().as_bytes().ct_eq(admin.username.as_bytes());
    let pass_ok = hash.as_bytes().ct_eq(admin.password_sha256.as_bytes());
    (user_ok & pass_ok).into()
}

async fn login(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Response, ApiError> {
    let rid = &req_id.0;
    let Some(admin) = state.config.admin.as_ref() else {
        return Err(ApiError::new(rid, "bad_request", "admin login is not configured"));
    };
    if !credentials_match(admin, &body.username, &body.password) {
        tracing::warn!(username = %body.username.trim(), "admin login failed");
        return Err(ApiError::new(rid, "unauthorized", "invalid username or password"));
    }

    match db::admin_sessions::purge_expired(&state.pool).await {
        Ok(n) if n > 0 => tracing::debug!(purged = n, "expired admin sessions removed"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "could not purge expired admin sessions"),
    }

    let ttl = chrono::Duration::hours(state.config.session_ttl_hours);
    let (token, expires_at) = db::admin_sessions::create_session(&state.pool, &admin.username, ttl)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    tracing::info!(username = %admin.username, "admin logged in");

    let cookie = session_cookie(
        &token,
        ttl.num_seconds(),
        state.config.env == Environment::Production,
    );
    let body = ApiResponse::json(
        LoginResponse {
            token,
            username: admin.username.clone(),
            expires_at,
        },
        req_id.0.clone(),
    );
    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

async fn logout(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = session_token(&headers) {
        db::admin_sessions::delete_session(&state.pool, token)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    }
    tracing::info!(username = %admin.username, "admin logged out");
    let body = ApiResponse::json(LogoutResponse { logged_out: true }, req_id.0);
    Ok(([(header::SET_COOKIE, clear_session_cookie())], body).into_response())
}

// ---------------------------------------------------------------------------
// Dashboard and settings
// ---------------------------------------------------------------------------

async fn dashboard(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<DashboardStats>>, ApiError> {
    let rid = &req_id.0;
    let settings = crate::settings::load(&state.pool)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let threshold = i32::try_from(settings.low_stock_threshold).unwrap_or(i32::MAX);
    let stats = db::dashboard::load_stats(&state.pool, threshold, RECENT_ORDERS)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ApiResponse::json(stats, req_id.0))
}

async fn get_settings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<SiteSettings>>, ApiError> {
    let settings = crate::settings::load(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::json(settings, req_id.0))
}

async fn put_settings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    ApiJson(update): ApiJson<SettingsUpdate>,
) -> Result<Json<ApiResponse<SiteSettings>>, ApiError> {
    let rid = &req_id.0;
    let mut settings = crate::settings::load(&state.pool)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    settings.apply(update);
    settings.validate().map_err(|e| store_err(rid, e))?;

    db::settings::upsert_many(&state.pool, &settings.to_pairs())
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    tracing::info!(
        username = %admin.username,
        maintenance = settings.maintenance_mode,
        "site settings updated"
    );
    Ok(ApiResponse::json(settings, req_id.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> AdminCredentials {
        AdminCredentials {
            username: "inhaber".into(),
            password_sha256: sha256_hex(b"pfeffer:geheim123"),
            salt: "pfeffer".into(),
        }
    }

    #[test]
    fn credentials_require_salted_hash_and_username() {
        let admin = admin();
        assert!(credentials_match(&admin, "inhaber", "geheim123"));
        assert!(credentials_match(&admin, " inhaber ", "geheim123"));
        assert!(!credentials_match(&admin, "inhaber", "geheim124"));
        assert!(!credentials_match(&admin, "admin", "geheim123"));
        assert!(!credentials_match(&admin, "", ""));
    }
}
