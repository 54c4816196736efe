//! Product image upload, ordering and removal.

use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{self, images::ImageRow, images::NewImage};
use crate::StoreError;

use super::super::middleware::{AdminSession, RequestId};
use super::super::{map_db_error, ApiJson, ApiError, ApiResponse, AppState};
use super::store_err;

const MAX_ALT_TEXT: usize = 200;

#[derive(Debug, Deserialize)]
pub(crate) struct ReorderRequest {
    pub image_ids: Vec<Uuid>,
}

async fn ensure_product(state: &AppState, rid: &str, product_id: Uuid) -> Result<(), ApiError> {
    db::products::get_product(&state.pool, product_id)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .map(|_| ())
        .ok_or_else(|| store_err(rid, StoreError::ProductNotFound))
}

/// Reads one field fully, stopping as soon as it passes `limit`.
async fn read_limited(field: &mut Field<'_>, limit: usize) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| StoreError::InvalidImage(e.body_text()))?
    {
        if bytes.len() + chunk.len() > limit {
            return Err(StoreError::ImageTooLarge { limit });
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn multipart_error(rid: &str, e: &axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(rid, "payload_too_large", e.body_text())
    } else {
        ApiError::new(rid, "bad_request", e.body_text())
    }
}

pub(super) async fn list(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<ImageRow>>>, ApiError> {
    let rid = &req_id.0;
    ensure_product(&state, rid, product_id).await?;
    let rows = db::images::list_images(&state.pool, product_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ApiResponse::json(rows, req_id.0))
}

/// `multipart/form-data` with a `file` part and an optional `alt_text` part.
pub(super) async fn upload(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    Path(product_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<ImageRow>>), ApiError> {
    let rid = &req_id.0;
    ensure_product(&state, rid, product_id).await?;

    let mut file: Option<Vec<u8>> = None;
    let mut alt_text: Option<String> = None;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(rid, &e))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let bytes = read_limited(&mut field, state.media.max_bytes())
                    .await
                    .map_err(|e| store_err(rid, e))?;
                file = Some(bytes);
            }
            Some("alt_text") => {
                let text = field.text().await.map_err(|e| multipart_error(rid, &e))?;
                let text = text.trim();
                if text.chars().count() > MAX_ALT_TEXT {
                    return Err(ApiError::new(rid, "validation_error", "alt text is too long"));
                }
                alt_text = Some(text.to_string()).filter(|t| !t.is_empty());
            }
            _ => {}
        }
    }

    let Some(bytes) = file.filter(|b| !b.is_empty()) else {
        return Err(ApiError::new(rid, "validation_error", "a file part is required"));
    };

    let stored = state
        .media
        .store_product_image(product_id, bytes)
        .await
        .map_err(|e| store_err(rid, e))?;

    let new = NewImage {
        id: stored.id,
        product_id,
        file_stem: &stored.file_stem,
        url: &stored.url,
        thumb_url: &stored.thumb_url,
        width: i32::try_from(stored.width).unwrap_or(i32::MAX),
        height: i32::try_from(stored.height).unwrap_or(i32::MAX),
        alt_text: alt_text.as_deref(),
    };
    let row = match db::images::insert_image(&state.pool, &new).await {
        Ok(row) => row,
        Err(e) => {
            if let Err(cleanup) = state.media.remove_product_image(product_id, &stored.file_stem).await {
                tracing::warn!(error = %cleanup, image_id = %stored.id, "orphaned image files left behind");
            }
            return Err(map_db_error(rid.clone(), &e));
        }
    };
    tracing::info!(username = %admin.username, product_id = %product_id, image_id = %row.id, "image uploaded");
    Ok((StatusCode::CREATED, ApiResponse::json(row, req_id.0)))
}

pub(super) async fn set_primary(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ImageRow>>, ApiError> {
    let rid = &req_id.0;
    db::images::set_primary(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let row = db::images::get_image(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", "image not found"))?;
    Ok(ApiResponse::json(row, req_id.0))
}

pub(super) async fn reorder(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<Uuid>,
    ApiJson(body): ApiJson<ReorderRequest>,
) -> Result<Json<ApiResponse<Vec<ImageRow>>>, ApiError> {
    let rid = &req_id.0;
    ensure_product(&state, rid, product_id).await?;
    db::images::reorder_images(&state.pool, product_id, &body.image_ids)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let rows = db::images::list_images(&state.pool, product_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ApiResponse::json(rows, req_id.0))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(admin): Extension<AdminSession>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let rid = &req_id.0;
    let row = db::images::delete_image(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", "image not found"))?;

    if let Err(e) = state.media.remove_product_image(row.product_id, &row.file_stem).await {
        tracing::warn!(error = %e, image_id = %id, "image row deleted but files remain");
    }
    tracing::info!(username = %admin.username, image_id = %id, "image deleted");
    Ok(StatusCode::NO_CONTENT)
}
