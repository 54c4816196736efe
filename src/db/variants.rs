//! Database operations for the `product_variants` table.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::{NewVariant, Variant};
use crate::domain::value_objects::{Quantity, Sku};

use super::DbError;

/// A row from the `product_variants` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct VariantRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub size: String,
    pub color: String,
    pub stock: i32,
    pub price_override: Option<Decimal>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<VariantRow> for Variant {
    fn from(row: VariantRow) -> Self {
        Variant {
            id: row.id,
            sku: Sku::from_stored(row.sku),
            size: row.size,
            color: row.color,
            stock: Quantity::new(u32::try_from(row.stock).unwrap_or(0)),
            price_override: row.price_override,
            active: row.active,
        }
    }
}

/// Variant at or below the low-stock threshold, with its product name.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LowStockRow {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub size: String,
    pub color: String,
    pub stock: i32,
}

/// Insert/update payload.
#[derive(Debug, Clone)]
pub struct VariantInput<'a> {
    pub sku: &'a str,
    pub size: &'a str,
    pub color: &'a str,
    pub stock: i32,
    pub price_override: Option<Decimal>,
    pub active: bool,
}

const COLUMNS: &str =
    "id, product_id, sku, size, color, stock, price_override, active, created_at, updated_at";

/// Variants of one product, ordered by creation.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_variants(pool: &PgPool, product_id: Uuid) -> Result<Vec<VariantRow>, DbError> {
    let rows = sqlx::query_as::<_, VariantRow>(&format!(
        "SELECT {COLUMNS} FROM product_variants WHERE product_id = $1 ORDER BY created_at, id"
    ))
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_variant(pool: &PgPool, id: Uuid) -> Result<Option<VariantRow>, DbError> {
    let row = sqlx::query_as::<_, VariantRow>(&format!(
        "SELECT {COLUMNS} FROM product_variants WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a duplicate SKU
/// or size/color pair).
pub async fn create_variant(
    pool: &PgPool,
    product_id: Uuid,
    input: &VariantInput<'_>,
) -> Result<VariantRow, DbError> {
    let row = sqlx::query_as::<_, VariantRow>(&format!(
        "INSERT INTO product_variants (id, product_id, sku, size, color, stock, price_override, active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(product_id)
    .bind(input.sku)
    .bind(input.size)
    .bind(input.color)
    .bind(input.stock)
    .bind(input.price_override)
    .bind(input.active)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has `id`, or [`DbError::Sqlx`] on failure.
pub async fn update_variant(
    pool: &PgPool,
    id: Uuid,
    input: &VariantInput<'_>,
) -> Result<VariantRow, DbError> {
    sqlx::query_as::<_, VariantRow>(&format!(
        "UPDATE product_variants \
         SET sku = $2, size = $3, color = $4, stock = $5, price_override = $6, active = $7, \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(input.sku)
    .bind(input.size)
    .bind(input.color)
    .bind(input.stock)
    .bind(input.price_override)
    .bind(input.active)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns `true` if a row was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_variant(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM product_variants WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Applies `delta` to the stock in a single statement. Returns the new stock,
/// or `None` when the variant is missing or the result would be negative.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn adjust_stock(pool: &PgPool, id: Uuid, delta: i32) -> Result<Option<i32>, DbError> {
    let stock = sqlx::query_scalar::<_, i32>(
        "UPDATE product_variants \
         SET stock = stock + $2, updated_at = NOW() \
         WHERE id = $1 AND stock + $2 >= 0 \
         RETURNING stock",
    )
    .bind(id)
    .bind(delta)
    .fetch_optional(pool)
    .await?;
    Ok(stock)
}

/// Inserts a generated size × color matrix in one transaction, all with zero stock.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails; nothing is written in that case.
pub async fn insert_matrix(
    pool: &PgPool,
    product_id: Uuid,
    variants: &[NewVariant],
) -> Result<Vec<VariantRow>, DbError> {
    let mut tx = pool.begin().await?;
    let mut rows = Vec::with_capacity(variants.len());
    for variant in variants {
        let row = sqlx::query_as::<_, VariantRow>(&format!(
            "INSERT INTO product_variants (id, product_id, sku, size, color, stock, active) \
             VALUES ($1, $2, $3, $4, $5, 0, TRUE) \
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(product_id)
        .bind(variant.sku.as_str())
        .bind(&variant.size)
        .bind(&variant.color)
        .fetch_one(&mut *tx)
        .await?;
        rows.push(row);
    }
    tx.commit().await?;
    Ok(rows)
}

/// Active variants with `stock <= threshold`, lowest stock first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_low_stock(
    pool: &PgPool,
    threshold: i32,
    limit: i64,
) -> Result<Vec<LowStockRow>, DbError> {
    let rows = sqlx::query_as::<_, LowStockRow>(
        "SELECT v.id AS variant_id, v.product_id, p.name_de AS product_name, v.sku, v.size, \
                v.color, v.stock \
         FROM product_variants v \
         JOIN products p ON p.id = v.product_id \
         WHERE v.active AND p.status <> 'archived' AND v.stock <= $1 \
         ORDER BY v.stock, p.name_de, v.sku \
         LIMIT $2",
    )
    .bind(threshold)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
