//! Customer list, detail with order history, and contact edits.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::{
    self,
    customers::{CustomerInput, CustomerRow, CustomerSummaryRow},
    orders::OrderRow,
    Page,
};
use crate::domain::value_objects::Email;
use crate::i18n::Locale;
use crate::StoreError;

use super::super::middleware::{AdminSession, RequestId};
use super::super::{map_db_error, ApiJson, validate_body, ApiError, ApiResponse, AppState, Paginated};
use super::store_err;

#[derive(Debug, Deserialize)]
pub(crate) struct CustomerListQuery {
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CustomerUpdateRequest {
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
    pub locale: Locale,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CustomerDetail {
    #[serde(flatten)]
    customer: CustomerRow,
    orders: Vec<OrderRow>,
}

pub(super) async fn list(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<CustomerListQuery>,
) -> Result<Json<ApiResponse<Paginated<CustomerSummaryRow>>>, ApiError> {
    let page = Page::new(query.page, query.per_page);
    let (rows, total) = db::customers::list_customers(&state.pool, query.q.as_deref(), page)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::json(Paginated::new(rows, total, page), req_id.0))
}

pub(super) async fn detail(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CustomerDetail>>, ApiError> {
    let rid = &req_id.0;
    let customer = db::customers::get_customer(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| store_err(rid, StoreError::CustomerNotFound))?;
    let orders = db::orders::list_customer_orders(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ApiResponse::json(CustomerDetail { customer, orders }, req_id.0))
}

pub(super) async fn update(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<CustomerUpdateRequest>,
) -> Result<Json<ApiResponse<CustomerRow>>, ApiError> {
    let rid = &req_id.0;
    validate_body(rid, &body)?;
    let email = Email::parse(&body.email)
        .map_err(|e| store_err(rid, StoreError::Validation(e.to_string())))?;

    let country = body.country.trim().to_ascii_uppercase();
    let input = CustomerInput {
        email: email.as_str(),
        first_name: body.first_name.trim(),
        last_name: body.last_name.trim(),
        phone: body.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()),
        street: body.street.trim(),
        postal_code: body.postal_code.trim(),
        city: body.city.trim(),
        country: &country,
        locale: body.locale.as_str(),
    };
    let notes = body.notes.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let row = db::customers::update_customer(&state.pool, id, &input, notes)
        .await
        .map_err(|e| match e {
            db::DbError::NotFound => store_err(rid, StoreError::CustomerNotFound),
            e => map_db_error(rid.clone(), &e),
        })?;
    tracing::info!(username = %admin.username, customer_id = %id, "customer updated");
    Ok(ApiResponse::json(row, req_id.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_request_accepts_locale_codes() {
        let body: CustomerUpdateRequest = serde_json::from_value(serde_json::json!({
            "email": "Noor@Example.com",
            "first_name": "Noor",
            "last_name": "Haddad",
            "street": "Sonnenallee 12",
            "postal_code": "12045",
            "city": "Berlin",
            "country": "de",
            "locale": "ar",
            "notes": "Lieferung nur nachmittags"
        }))
        .unwrap();
        assert!(body.validate().is_ok());
        assert_eq!(body.locale, Locale::Ar);
        assert_eq!(Email::parse(&body.email).unwrap().as_str(), "noor@example.com");
    }
}
