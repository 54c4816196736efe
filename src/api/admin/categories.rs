//! Category CRUD. Deletion is refused while children or products remain.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::{self, categories::CategoryInput, categories::CategoryRow};
use crate::domain::aggregates::{Category, CategoryTree};
use crate::domain::value_objects::Slug;
use crate::i18n::Localized;
use crate::StoreError;

use super::super::middleware::{AdminSession, RequestId};
use super::super::{map_db_error, ApiJson, validate_body, ApiError, ApiResponse, AppState};
use super::store_err;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CategoryRequest {
    pub parent_id: Option<Uuid>,
    #[validate(length(max = 120))]
    pub slug: Option<String>,
    pub name: Localized,
    #[serde(default)]
    #[validate(range(min = 0, max = 10_000))]
    pub position: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub(crate) struct AdminCategory {
    id: Uuid,
    parent_id: Option<Uuid>,
    slug: String,
    name: Localized,
    position: i32,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for AdminCategory {
    fn from(row: CategoryRow) -> Self {
        Self {
            name: row.name(),
            id: row.id,
            parent_id: row.parent_id,
            slug: row.slug,
            position: row.position,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CategoryDetail {
    #[serde(flatten)]
    category: AdminCategory,
    children: i64,
    products: i64,
    path: Vec<String>,
}

fn category_slug(body: &CategoryRequest) -> Result<Slug, StoreError> {
    if body.name.de.trim().is_empty() && body.name.en.trim().is_empty() {
        return Err(StoreError::Validation("a German or English name is required".into()));
    }
    let slug = match body.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => Slug::from_name(slug),
        None => Slug::from_name_or(&body.name.de, &body.name.en),
    };
    if slug.is_empty() {
        return Err(StoreError::Validation("slug must contain latin letters or digits".into()));
    }
    Ok(slug)
}

async fn all_categories(state: &AppState, rid: &str) -> Result<Vec<Category>, ApiError> {
    let rows = db::categories::list_categories(&state.pool)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?;
    Ok(rows.into_iter().map(Category::from).collect())
}

pub(super) async fn list(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<AdminCategory>>>, ApiError> {
    let rows = db::categories::list_categories(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::json(rows.into_iter().map(AdminCategory::from).collect(), req_id.0))
}

pub(super) async fn detail(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CategoryDetail>>, ApiError> {
    let rid = &req_id.0;
    let row = db::categories::get_category(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| store_err(rid, StoreError::CategoryNotFound))?;
    let (children, products) = db::categories::count_dependents(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let categories = all_categories(&state, rid).await?;
    let path = CategoryTree::new(&categories)
        .breadcrumb(id)
        .iter()
        .map(|c| c.slug.clone())
        .collect();

    let data = CategoryDetail {
        category: row.into(),
        children,
        products,
        path,
    };
    Ok(ApiResponse::json(data, req_id.0))
}

pub(super) async fn create(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    ApiJson(body): ApiJson<CategoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AdminCategory>>), ApiError> {
    let rid = &req_id.0;
    validate_body(rid, &body)?;
    let slug = category_slug(&body).map_err(|e| store_err(rid, e))?;
    if let Some(parent) = body.parent_id {
        db::categories::get_category(&state.pool, parent)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?
            .ok_or_else(|| store_err(rid, StoreError::CategoryNotFound))?;
    }

    let input = CategoryInput {
        parent_id: body.parent_id,
        slug: slug.as_str(),
        name: &body.name,
        position: body.position,
        active: body.active,
    };
    let row = db::categories::create_category(&state.pool, &input)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    tracing::info!(username = %admin.username, category_id = %row.id, slug = %row.slug, "category created");
    Ok((StatusCode::CREATED, ApiResponse::json(row.into(), req_id.0)))
}

pub(super) async fn update(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<CategoryRequest>,
) -> Result<Json<ApiResponse<AdminCategory>>, ApiError> {
    let rid = &req_id.0;
    validate_body(rid, &body)?;
    let slug = category_slug(&body).map_err(|e| store_err(rid, e))?;

    let categories = all_categories(&state, rid).await?;
    let tree = CategoryTree::new(&categories);
    if tree.get(id).is_none() {
        return Err(store_err(rid, StoreError::CategoryNotFound));
    }
    tree.validate_parent(id, body.parent_id)
        .map_err(|e| store_err(rid, e))?;

    let input = CategoryInput {
        parent_id: body.parent_id,
        slug: slug.as_str(),
        name: &body.name,
        position: body.position,
        active: body.active,
    };
    let row = db::categories::update_category(&state.pool, id, &input)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    tracing::info!(username = %admin.username, category_id = %id, "category updated");
    Ok(ApiResponse::json(row.into(), req_id.0))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let rid = &req_id.0;
    let (children, products) = db::categories::count_dependents(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if children > 0 || products > 0 {
        return Err(store_err(rid, StoreError::CategoryNotEmpty));
    }

    let deleted = db::categories::delete_category(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if !deleted {
        return Err(store_err(rid, StoreError::CategoryNotFound));
    }
    tracing::info!(username = %admin.username, category_id = %id, "category deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: serde_json::Value) -> CategoryRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn slug_falls_back_to_english_name() {
        let body = request(serde_json::json!({ "name": { "en": "Evening Wear", "ar": "ملابس سهرة" } }));
        assert!(body.active);
        assert_eq!(category_slug(&body).unwrap().as_str(), "evening-wear");
    }

    #[test]
    fn explicit_slug_is_normalized() {
        let body = request(serde_json::json!({ "slug": "Schuhe & Taschen", "name": { "de": "Schuhe" } }));
        assert_eq!(category_slug(&body).unwrap().as_str(), "schuhe-taschen");
    }

    #[test]
    fn arabic_only_name_is_rejected() {
        let body = request(serde_json::json!({ "name": { "ar": "أحذية" } }));
        assert!(matches!(category_slug(&body), Err(StoreError::Validation(_))));
    }
}
