//! Database operations for the `cart_items` table.

use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartError, CartItem};
use crate::domain::value_objects::Money;
use crate::i18n::{Locale, Localized};

use super::DbError;

/// A cart line joined with its variant, product and cover image.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartLineRow {
    pub variant_id: Uuid,
    pub quantity: i32,
    pub product_id: Uuid,
    pub product_slug: String,
    pub name_de: String,
    pub name_en: String,
    pub name_ar: String,
    pub sku: String,
    pub size: String,
    pub color: String,
    pub stock: i32,
    pub purchasable: bool,
    pub unit_price: Decimal,
    pub image_url: Option<String>,
}

impl CartLineRow {
    /// Lines for variants that are inactive or whose product is not active
    /// report zero availability.
    pub fn into_item(self, locale: Locale, currency: &str) -> CartItem {
        let name = Localized::new(&self.name_de, &self.name_en, &self.name_ar);
        let available = if self.purchasable { u32::try_from(self.stock).unwrap_or(0) } else { 0 };
        CartItem {
            variant_id: self.variant_id,
            product_id: self.product_id,
            product_slug: self.product_slug,
            name: name.get(locale).to_string(),
            sku: self.sku,
            size: self.size,
            color: self.color,
            quantity: u32::try_from(self.quantity).unwrap_or(0),
            unit_price: Money::new(self.unit_price, currency),
            available,
            image_url: self.image_url,
        }
    }
}

const LINE_FIELDS: &str = "p.id AS product_id, p.slug AS product_slug, \
     p.name_de, p.name_en, p.name_ar, v.sku, v.size, v.color, v.stock, \
     (v.active AND p.status = 'active') AS purchasable, \
     COALESCE(v.price_override, p.price) AS unit_price, \
     (SELECT i.thumb_url FROM product_images i WHERE i.product_id = p.id \
      ORDER BY i.is_primary DESC, i.position LIMIT 1) AS image_url";

/// Lines of one session's cart in insertion order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_cart_lines(pool: &PgPool, session_id: &str) -> Result<Vec<CartLineRow>, DbError> {
    Ok(fetch_lines(pool, session_id).await?)
}

async fn fetch_lines<'c>(
    executor: impl PgExecutor<'c>,
    session_id: &str,
) -> Result<Vec<CartLineRow>, sqlx::Error> {
    sqlx::query_as::<_, CartLineRow>(&format!(
        "SELECT c.variant_id, c.quantity, {LINE_FIELDS} \
         FROM cart_items c \
         JOIN product_variants v ON v.id = c.variant_id \
         JOIN products p ON p.id = v.product_id \
         WHERE c.session_id = $1 \
         ORDER BY c.created_at, c.id"
    ))
    .bind(session_id)
    .fetch_all(executor)
    .await
}

/// Writes the line with an absolute quantity, inserting it if needed.
async fn write_line<'c>(
    executor: impl PgExecutor<'c>,
    session_id: &str,
    variant_id: Uuid,
    quantity: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO cart_items (id, session_id, variant_id, quantity) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (session_id, variant_id) DO UPDATE \
         SET quantity = EXCLUDED.quantity, updated_at = NOW()",
    )
    .bind(Uuid::now_v7())
    .bind(session_id)
    .bind(variant_id)
    .bind(quantity)
    .execute(executor)
    .await?;
    Ok(())
}

/// Failures of [`change_line`].
#[derive(Debug, Error)]
pub enum CartWriteError {
    #[error("variant not found")]
    VariantNotFound,
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for CartWriteError {
    fn from(e: sqlx::Error) -> Self {
        Self::Db(DbError::Sqlx(e))
    }
}

/// Applies `change` to the session's cart and persists the resulting
/// quantity of `variant_id`, removing the line when it drops to zero.
///
/// The variant row is locked `FOR UPDATE` before the cart is read, so
/// concurrent writes to the same line serialize and each one sees the
/// quantity the previous one committed. `change` receives the variant shaped
/// as a zero-quantity item with its current stock.
///
/// # Errors
///
/// Returns [`CartWriteError::VariantNotFound`] for an unknown variant,
/// [`CartWriteError::Cart`] when `change` refuses, and [`CartWriteError::Db`]
/// on database failure. Nothing is written on error.
pub async fn change_line<F>(
    pool: &PgPool,
    session_id: &str,
    variant_id: Uuid,
    locale: Locale,
    currency: &str,
    change: F,
) -> Result<Cart, CartWriteError>
where
    F: FnOnce(&mut Cart, CartItem) -> Result<(), CartError>,
{
    let mut tx = pool.begin().await?;

    let variant = sqlx::query_as::<_, CartLineRow>(&format!(
        "SELECT v.id AS variant_id, 0 AS quantity, {LINE_FIELDS} \
         FROM product_variants v \
         JOIN products p ON p.id = v.product_id \
         WHERE v.id = $1 \
         FOR UPDATE OF v"
    ))
    .bind(variant_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(CartWriteError::VariantNotFound)?;

    let items = fetch_lines(&mut *tx, session_id)
        .await?
        .into_iter()
        .map(|l| l.into_item(locale, currency))
        .collect();
    let mut cart = Cart::with_items(session_id, currency, items);
    change(&mut cart, variant.into_item(locale, currency))?;

    let quantity = cart.quantity_of(variant_id);
    if quantity == 0 {
        sqlx::query("DELETE FROM cart_items WHERE session_id = $1 AND variant_id = $2")
            .bind(session_id)
            .bind(variant_id)
            .execute(&mut *tx)
            .await?;
    } else {
        write_line(&mut *tx, session_id, variant_id, i32::try_from(quantity).unwrap_or(i32::MAX))
            .await?;
    }
    tx.commit().await?;
    Ok(cart)
}

/// Returns `true` if a line was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn remove_line(pool: &PgPool, session_id: &str, variant_id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE session_id = $1 AND variant_id = $2")
        .bind(session_id)
        .bind(variant_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn clear_cart(pool: &PgPool, session_id: &str) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE session_id = $1")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
