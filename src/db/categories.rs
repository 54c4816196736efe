//! Database operations for the `categories` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::Category;
use crate::i18n::Localized;

use super::DbError;

/// A row from the `categories` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub slug: String,
    pub name_de: String,
    pub name_en: String,
    pub name_ar: String,
    pub position: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CategoryRow {
    pub fn name(&self) -> Localized {
        Localized::new(&self.name_de, &self.name_en, &self.name_ar)
    }
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            parent_id: row.parent_id,
            slug: row.slug.clone(),
            name: row.name(),
            position: row.position,
            active: row.active,
        }
    }
}

/// Insert/update payload.
#[derive(Debug, Clone)]
pub struct CategoryInput<'a> {
    pub parent_id: Option<Uuid>,
    pub slug: &'a str,
    pub name: &'a Localized,
    pub position: i32,
    pub active: bool,
}

const COLUMNS: &str =
    "id, parent_id, slug, name_de, name_en, name_ar, position, active, created_at, updated_at";

/// Returns every category ordered by position, then slug.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_categories(pool: &PgPool) -> Result<Vec<CategoryRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {COLUMNS} FROM categories ORDER BY position, slug"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_category(pool: &PgPool, id: Uuid) -> Result<Option<CategoryRow>, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {COLUMNS} FROM categories WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_category_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<CategoryRow>, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {COLUMNS} FROM categories WHERE slug = $1"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a duplicate slug).
pub async fn create_category(
    pool: &PgPool,
    input: &CategoryInput<'_>,
) -> Result<CategoryRow, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "INSERT INTO categories (id, parent_id, slug, name_de, name_en, name_ar, position, active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(input.parent_id)
    .bind(input.slug)
    .bind(&input.name.de)
    .bind(&input.name.en)
    .bind(&input.name.ar)
    .bind(input.position)
    .bind(input.active)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has `id`, or [`DbError::Sqlx`] on failure.
pub async fn update_category(
    pool: &PgPool,
    id: Uuid,
    input: &CategoryInput<'_>,
) -> Result<CategoryRow, DbError> {
    sqlx::query_as::<_, CategoryRow>(&format!(
        "UPDATE categories \
         SET parent_id = $2, slug = $3, name_de = $4, name_en = $5, name_ar = $6, \
             position = $7, active = $8, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(input.parent_id)
    .bind(input.slug)
    .bind(&input.name.de)
    .bind(&input.name.en)
    .bind(&input.name.ar)
    .bind(input.position)
    .bind(input.active)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Number of direct subcategories and of products assigned to `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_dependents(pool: &PgPool, id: Uuid) -> Result<(i64, i64), DbError> {
    let counts = sqlx::query_as::<_, (i64, i64)>(
        "SELECT \
            (SELECT COUNT(*) FROM categories WHERE parent_id = $1), \
            (SELECT COUNT(*) FROM products WHERE category_id = $1)",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;
    Ok(counts)
}

/// Returns `true` if a row was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_category(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
