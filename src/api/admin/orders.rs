//! Order list, detail and status changes.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::{self, orders::OrderDetail, orders::OrderRow, Page};
use crate::domain::aggregates::OrderStatus;
use crate::StoreError;

use super::super::middleware::{AdminSession, RequestId};
use super::super::{map_db_error, ApiJson, validate_body, ApiError, ApiResponse, AppState, Paginated};
use super::store_err;

#[derive(Debug, Deserialize)]
pub(crate) struct OrderListQuery {
    pub status: Option<String>,
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct StatusChangeRequest {
    pub status: String,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
    #[serde(default)]
    pub mark_paid: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct AdminOrderDetail {
    #[serde(flatten)]
    detail: OrderDetail,
    next_statuses: Vec<OrderStatus>,
}

fn parse_status(rid: &str, raw: &str) -> Result<OrderStatus, ApiError> {
    OrderStatus::parse(raw)
        .ok_or_else(|| ApiError::new(rid, "validation_error", format!("unknown order status '{raw}'")))
}

async fn detail_view(state: &AppState, rid: &str, id: Uuid) -> Result<AdminOrderDetail, ApiError> {
    let detail = db::orders::get_order(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .ok_or_else(|| store_err(rid, StoreError::OrderNotFound))?;
    let next_statuses = OrderStatus::parse(&detail.order.status)
        .map(|s| s.next_statuses())
        .unwrap_or_default();
    Ok(AdminOrderDetail { detail, next_statuses })
}

pub(super) async fn list(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<ApiResponse<Paginated<OrderRow>>>, ApiError> {
    let rid = &req_id.0;
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(parse_status(rid, raw)?),
        None => None,
    };
    let page = Page::new(query.page, query.per_page);

    let (rows, total) = db::orders::list_orders(&state.pool, status, query.q.as_deref(), page)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ApiResponse::json(Paginated::new(rows, total, page), req_id.0))
}

pub(super) async fn detail(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AdminOrderDetail>>, ApiError> {
    let view = detail_view(&state, &req_id.0, id).await?;
    Ok(ApiResponse::json(view, req_id.0))
}

/// Moves an order along the state machine. Cancelling or refunding puts
/// the ordered quantities back in stock within the same transaction.
pub(super) async fn change_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<StatusChangeRequest>,
) -> Result<Json<ApiResponse<AdminOrderDetail>>, ApiError> {
    let rid = &req_id.0;
    validate_body(rid, &body)?;
    let to = parse_status(rid, &body.status)?;
    let note = body
        .note
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_owned);

    let mut order = db::orders::apply_status_change(&state.pool, id, to, note, body.mark_paid)
        .await
        .map_err(|e| store_err(rid, e))?;
    tracing::info!(
        username = %admin.username,
        order_number = order.order_number(),
        status = %to,
        "order status updated"
    );
    state.bus.publish(order.take_events()).await;

    let view = detail_view(&state, rid, id).await?;
    Ok(ApiResponse::json(view, req_id.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_is_a_validation_error() {
        let err = parse_status("r", "lost").unwrap_err();
        assert_eq!(err.error.code, "validation_error");
        assert!(err.error.message.contains("lost"));
        assert_eq!(parse_status("r", "Shipped").unwrap(), OrderStatus::Shipped);
    }

    #[test]
    fn status_change_defaults() {
        let body: StatusChangeRequest =
            serde_json::from_value(serde_json::json!({ "status": "confirmed" })).unwrap();
        assert!(!body.mark_paid);
        assert!(body.note.is_none());
        assert!(body.validate().is_ok());
    }
}
