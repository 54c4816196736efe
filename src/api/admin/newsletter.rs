//! Newsletter subscriber list and removal.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{self, newsletter::SubscriberRow, Page};

use super::super::middleware::{AdminSession, RequestId};
use super::super::{map_db_error, ApiError, ApiResponse, AppState, Paginated};

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriberQuery {
    pub active: Option<bool>,
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub(super) async fn list(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SubscriberQuery>,
) -> Result<Json<ApiResponse<Paginated<SubscriberRow>>>, ApiError> {
    let page = Page::new(query.page, query.per_page);
    let (rows, total) =
        db::newsletter::list_subscribers(&state.pool, query.active, query.q.as_deref(), page)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::json(Paginated::new(rows, total, page), req_id.0))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let rid = &req_id.0;
    let deleted = db::newsletter::delete_subscriber(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if !deleted {
        return Err(ApiError::new(rid, "not_found", "subscriber not found"));
    }
    tracing::info!(username = %admin.username, subscriber_id = %id, "newsletter subscriber removed");
    Ok(StatusCode::NO_CONTENT)
}
