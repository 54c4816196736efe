//! Database operations for the `products` table.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::{Product, ProductParts, ProductStatus, Variant};
use crate::domain::value_objects::{Money, Sku};
use crate::i18n::Localized;

use super::{like_pattern, DbError, Page};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub sku: String,
    pub slug: String,
    pub name_de: String,
    pub name_en: String,
    pub name_ar: String,
    pub description_de: String,
    pub description_en: String,
    pub description_ar: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub status: String,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRow {
    pub fn name(&self) -> Localized {
        Localized::new(&self.name_de, &self.name_en, &self.name_ar)
    }

    pub fn description(&self) -> Localized {
        Localized::new(&self.description_de, &self.description_en, &self.description_ar)
    }

    pub fn into_product(self, currency: &str, variants: Vec<Variant>) -> Product {
        Product::restore(
            ProductParts {
                id: self.id,
                sku: Sku::from_stored(&self.sku),
                slug: self.slug.clone(),
                name: self.name(),
                description: self.description(),
                price: Money::new(self.price, currency),
                compare_at_price: self.compare_at_price.map(|p| Money::new(p, currency)),
                category_id: self.category_id,
                status: ProductStatus::parse(&self.status).unwrap_or_default(),
                featured: self.featured,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            variants,
        )
    }
}

/// Listing row: a product plus its stock and cover image.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductCardRow {
    pub id: Uuid,
    pub sku: String,
    pub slug: String,
    pub name_de: String,
    pub name_en: String,
    pub name_ar: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub status: String,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub total_stock: i64,
    pub image_url: Option<String>,
}

impl ProductCardRow {
    pub fn name(&self) -> Localized {
        Localized::new(&self.name_de, &self.name_en, &self.name_ar)
    }
}

/// Name suggestion for the storefront search box.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SuggestionRow {
    pub slug: String,
    pub name_de: String,
    pub name_en: String,
    pub name_ar: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl ProductSort {
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("price_asc") => Self::PriceAsc,
            Some("price_desc") => Self::PriceDesc,
            Some("name") => Self::Name,
            _ => Self::Newest,
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "p.created_at DESC, p.id",
            Self::PriceAsc => "p.price ASC, p.id",
            Self::PriceDesc => "p.price DESC, p.id",
            Self::Name => "LOWER(p.name_de) ASC, p.id",
        }
    }
}

/// Input filters for product listing. `None` means "no restriction".
#[derive(Debug, Clone, Default)]
pub struct ProductFilters {
    pub status: Option<String>,
    pub search: Option<String>,
    pub category_ids: Option<Vec<Uuid>>,
    pub featured: Option<bool>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub in_stock_only: bool,
    pub sort: ProductSort,
}

/// Insert/update payload.
#[derive(Debug, Clone)]
pub struct ProductInput<'a> {
    pub sku: &'a str,
    pub slug: &'a str,
    pub name: &'a Localized,
    pub description: &'a Localized,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub status: ProductStatus,
    pub featured: bool,
}

const COLUMNS: &str = "id, sku, slug, name_de, name_en, name_ar, description_de, description_en, \
     description_ar, price, compare_at_price, category_id, status, featured, created_at, updated_at";

const FILTER_SQL: &str = "WHERE ($1::TEXT IS NULL OR p.status = $1) \
       AND ($2::TEXT IS NULL OR p.name_de ILIKE $2 OR p.name_en ILIKE $2 OR p.name_ar ILIKE $2 \
            OR p.sku ILIKE $2) \
       AND ($3::UUID[] IS NULL OR p.category_id = ANY($3)) \
       AND ($4::BOOLEAN IS NULL OR p.featured = $4) \
       AND ($5::NUMERIC IS NULL OR p.price >= $5) \
       AND ($6::NUMERIC IS NULL OR p.price <= $6) \
       AND (NOT $7 OR EXISTS (SELECT 1 FROM product_variants v \
                              WHERE v.product_id = p.id AND v.active AND v.stock > 0))";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns one page of product cards and the total number of matches.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn list_products(
    pool: &PgPool,
    filters: &ProductFilters,
    page: Page,
) -> Result<(Vec<ProductCardRow>, i64), DbError> {
    let search = filters
        .search
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(like_pattern);

    let rows = sqlx::query_as::<_, ProductCardRow>(&format!(
        "SELECT p.id, p.sku, p.slug, p.name_de, p.name_en, p.name_ar, p.price, p.compare_at_price, \
                p.category_id, p.status, p.featured, p.created_at, \
                COALESCE((SELECT SUM(v.stock) FROM product_variants v \
                          WHERE v.product_id = p.id AND v.active), 0)::BIGINT AS total_stock, \
                (SELECT i.thumb_url FROM product_images i WHERE i.product_id = p.id \
                 ORDER BY i.is_primary DESC, i.position LIMIT 1) AS image_url \
         FROM products p \
         {FILTER_SQL} \
         ORDER BY {} \
         LIMIT $8 OFFSET $9",
        filters.sort.order_by()
    ))
    .bind(filters.status.as_deref())
    .bind(search.as_deref())
    .bind(filters.category_ids.as_deref())
    .bind(filters.featured)
    .bind(filters.min_price)
    .bind(filters.max_price)
    .bind(filters.in_stock_only)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM products p {FILTER_SQL}"
    ))
    .bind(filters.status.as_deref())
    .bind(search.as_deref())
    .bind(filters.category_ids.as_deref())
    .bind(filters.featured)
    .bind(filters.min_price)
    .bind(filters.max_price)
    .bind(filters.in_stock_only)
    .fetch_one(pool)
    .await?;

    Ok((rows, total))
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product(pool: &PgPool, id: Uuid) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {COLUMNS} FROM products WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product_by_slug(pool: &PgPool, slug: &str) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {COLUMNS} FROM products WHERE slug = $1"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Active products whose name starts with or contains `term`, prefix matches first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn suggest_products(
    pool: &PgPool,
    term: &str,
    limit: i64,
) -> Result<Vec<SuggestionRow>, DbError> {
    let rows = sqlx::query_as::<_, SuggestionRow>(
        "SELECT slug, name_de, name_en, name_ar \
         FROM products \
         WHERE status = 'active' \
           AND (name_de ILIKE $1 OR name_en ILIKE $1 OR name_ar ILIKE $1) \
         ORDER BY (name_de ILIKE $2 OR name_en ILIKE $2 OR name_ar ILIKE $2) DESC, name_de \
         LIMIT $3",
    )
    .bind(like_pattern(term))
    .bind(like_pattern(term).trim_start_matches('%').to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including duplicate SKU or slug).
pub async fn create_product(
    pool: &PgPool,
    id: Uuid,
    input: &ProductInput<'_>,
) -> Result<ProductRow, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "INSERT INTO products (id, sku, slug, name_de, name_en, name_ar, description_de, \
                               description_en, description_ar, price, compare_at_price, \
                               category_id, status, featured) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(input.sku)
    .bind(input.slug)
    .bind(&input.name.de)
    .bind(&input.name.en)
    .bind(&input.name.ar)
    .bind(&input.description.de)
    .bind(&input.description.en)
    .bind(&input.description.ar)
    .bind(input.price)
    .bind(input.compare_at_price)
    .bind(input.category_id)
    .bind(input.status.as_str())
    .bind(input.featured)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has `id`, or [`DbError::Sqlx`] on failure.
pub async fn update_product(
    pool: &PgPool,
    id: Uuid,
    input: &ProductInput<'_>,
) -> Result<ProductRow, DbError> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "UPDATE products \
         SET sku = $2, slug = $3, name_de = $4, name_en = $5, name_ar = $6, \
             description_de = $7, description_en = $8, description_ar = $9, price = $10, \
             compare_at_price = $11, category_id = $12, status = $13, featured = $14, \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(input.sku)
    .bind(input.slug)
    .bind(&input.name.de)
    .bind(&input.name.en)
    .bind(&input.name.ar)
    .bind(&input.description.de)
    .bind(&input.description.en)
    .bind(&input.description.ar)
    .bind(input.price)
    .bind(input.compare_at_price)
    .bind(input.category_id)
    .bind(input.status.as_str())
    .bind(input.featured)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has `id`, or [`DbError::Sqlx`] on failure.
pub async fn set_product_status(
    pool: &PgPool,
    id: Uuid,
    status: ProductStatus,
) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE products SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
