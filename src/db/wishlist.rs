//! Database operations for the `wishlist_items` table.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::i18n::Localized;

use super::DbError;

/// A wishlisted product with what the storefront needs to render it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WishlistRow {
    pub product_id: Uuid,
    pub slug: String,
    pub name_de: String,
    pub name_en: String,
    pub name_ar: String,
    pub price: Decimal,
    pub in_stock: bool,
    pub image_url: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl WishlistRow {
    pub fn name(&self) -> Localized {
        Localized::new(&self.name_de, &self.name_en, &self.name_ar)
    }
}

/// Active products on the session's wishlist, most recently added first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_wishlist(pool: &PgPool, session_id: &str) -> Result<Vec<WishlistRow>, DbError> {
    let rows = sqlx::query_as::<_, WishlistRow>(
        "SELECT p.id AS product_id, p.slug, p.name_de, p.name_en, p.name_ar, p.price, \
                EXISTS (SELECT 1 FROM product_variants v \
                        WHERE v.product_id = p.id AND v.active AND v.stock > 0) AS in_stock, \
                (SELECT i.thumb_url FROM product_images i WHERE i.product_id = p.id \
                 ORDER BY i.is_primary DESC, i.position LIMIT 1) AS image_url, \
                w.created_at AS added_at \
         FROM wishlist_items w \
         JOIN products p ON p.id = w.product_id \
         WHERE w.session_id = $1 AND p.status = 'active' \
         ORDER BY w.created_at DESC",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Adds the product; adding it twice is not an error. Returns `true` if a row
/// was inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including an unknown product).
pub async fn add_to_wishlist(
    pool: &PgPool,
    session_id: &str,
    product_id: Uuid,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO wishlist_items (session_id, product_id) VALUES ($1, $2) \
         ON CONFLICT (session_id, product_id) DO NOTHING",
    )
    .bind(session_id)
    .bind(product_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Returns `true` if a row was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn remove_from_wishlist(
    pool: &PgPool,
    session_id: &str,
    product_id: Uuid,
) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM wishlist_items WHERE session_id = $1 AND product_id = $2")
        .bind(session_id)
        .bind(product_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
