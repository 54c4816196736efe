//! Database operations for the `product_images` table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::DbError;

/// A row from the `product_images` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ImageRow {
    pub id: Uuid,
    pub product_id: Uuid,
    #[serde(skip)]
    pub file_stem: String,
    pub url: String,
    pub thumb_url: String,
    pub width: i32,
    pub height: i32,
    pub alt_text: Option<String>,
    pub position: i32,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a freshly processed upload.
#[derive(Debug, Clone)]
pub struct NewImage<'a> {
    pub id: Uuid,
    pub product_id: Uuid,
    pub file_stem: &'a str,
    pub url: &'a str,
    pub thumb_url: &'a str,
    pub width: i32,
    pub height: i32,
    pub alt_text: Option<&'a str>,
}

const COLUMNS: &str =
    "id, product_id, file_stem, url, thumb_url, width, height, alt_text, position, is_primary, created_at";

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_images(pool: &PgPool, product_id: Uuid) -> Result<Vec<ImageRow>, DbError> {
    let rows = sqlx::query_as::<_, ImageRow>(&format!(
        "SELECT {COLUMNS} FROM product_images WHERE product_id = $1 ORDER BY position, created_at"
    ))
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_image(pool: &PgPool, id: Uuid) -> Result<Option<ImageRow>, DbError> {
    let row = sqlx::query_as::<_, ImageRow>(&format!(
        "SELECT {COLUMNS} FROM product_images WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Appends the image after the product's last one. The first image of a
/// product becomes its primary image. The product row is locked while the
/// position and primary flag are computed, so concurrent uploads queue up.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist, or
/// [`DbError::Sqlx`] if the insert fails.
pub async fn insert_image(pool: &PgPool, image: &NewImage<'_>) -> Result<ImageRow, DbError> {
    let mut tx = pool.begin().await?;
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM products WHERE id = $1 FOR UPDATE")
        .bind(image.product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

    let row = sqlx::query_as::<_, ImageRow>(&format!(
        "INSERT INTO product_images \
            (id, product_id, file_stem, url, thumb_url, width, height, alt_text, position, is_primary) \
         SELECT $1, $2, $3, $4, $5, $6, $7, $8, \
                COALESCE(MAX(position) + 1, 0), COUNT(*) = 0 \
         FROM product_images WHERE product_id = $2 \
         RETURNING {COLUMNS}"
    ))
    .bind(image.id)
    .bind(image.product_id)
    .bind(image.file_stem)
    .bind(image.url)
    .bind(image.thumb_url)
    .bind(image.width)
    .bind(image.height)
    .bind(image.alt_text)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(row)
}

/// Makes `id` the only primary image of its product.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no image has `id`, or [`DbError::Sqlx`] on failure.
pub async fn set_primary(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    let product_id =
        sqlx::query_scalar::<_, Uuid>("SELECT product_id FROM product_images WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;

    sqlx::query("UPDATE product_images SET is_primary = FALSE WHERE product_id = $1 AND is_primary")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE product_images SET is_primary = TRUE WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Rewrites positions from the given order. Ids that do not belong to the
/// product are ignored; images missing from `ordered_ids` keep their place
/// after the listed ones.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any update fails; nothing is written in that case.
pub async fn reorder_images(
    pool: &PgPool,
    product_id: Uuid,
    ordered_ids: &[Uuid],
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    let listed = i32::try_from(ordered_ids.len()).unwrap_or(i32::MAX);

    sqlx::query(
        "UPDATE product_images SET position = position + $2 \
         WHERE product_id = $1 AND NOT (id = ANY($3))",
    )
    .bind(product_id)
    .bind(listed)
    .bind(ordered_ids)
    .execute(&mut *tx)
    .await?;

    for (position, id) in (0_i32..).zip(ordered_ids) {
        sqlx::query("UPDATE product_images SET position = $3 WHERE id = $1 AND product_id = $2")
            .bind(id)
            .bind(product_id)
            .bind(position)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Deletes the row and returns it so the caller can remove the files. When
/// the primary image goes, the next image in order is promoted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_image(pool: &PgPool, id: Uuid) -> Result<Option<ImageRow>, DbError> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query_as::<_, ImageRow>(&format!(
        "DELETE FROM product_images WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(deleted) = row.as_ref().filter(|r| r.is_primary) {
        sqlx::query(
            "UPDATE product_images SET is_primary = TRUE \
             WHERE id = (SELECT id FROM product_images WHERE product_id = $1 \
                         ORDER BY position, created_at LIMIT 1)",
        )
        .bind(deleted.product_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(row)
}
