//! Database operations for the `customers` table.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{like_pattern, DbError, Page};

/// A row from the `customers` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CustomerRow {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub street: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    pub locale: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Customer listing row with order statistics.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CustomerSummaryRow {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub city: String,
    pub country: String,
    pub order_count: i64,
    pub total_spent: Decimal,
    pub last_order_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Contact and address fields, written on checkout and by admins.
#[derive(Debug, Clone)]
pub struct CustomerInput<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: Option<&'a str>,
    pub street: &'a str,
    pub postal_code: &'a str,
    pub city: &'a str,
    pub country: &'a str,
    pub locale: &'a str,
}

const COLUMNS: &str = "id, email, first_name, last_name, phone, street, postal_code, city, \
     country, locale, notes, created_at, updated_at";

/// Inserts the customer or refreshes the stored contact details, keyed by email.
/// Returns the customer id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_customer(
    tx: &mut Transaction<'_, Postgres>,
    input: &CustomerInput<'_>,
) -> Result<Uuid, DbError> {
    let id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO customers \
            (id, email, first_name, last_name, phone, street, postal_code, city, country, locale) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (email) DO UPDATE \
         SET first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name, \
             phone = COALESCE(EXCLUDED.phone, customers.phone), street = EXCLUDED.street, \
             postal_code = EXCLUDED.postal_code, city = EXCLUDED.city, \
             country = EXCLUDED.country, locale = EXCLUDED.locale, updated_at = NOW() \
         RETURNING id",
    )
    .bind(Uuid::now_v7())
    .bind(input.email)
    .bind(input.first_name)
    .bind(input.last_name)
    .bind(input.phone)
    .bind(input.street)
    .bind(input.postal_code)
    .bind(input.city)
    .bind(input.country)
    .bind(input.locale)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

/// One page of customers with order statistics, newest first. `search` matches
/// email and names.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn list_customers(
    pool: &PgPool,
    search: Option<&str>,
    page: Page,
) -> Result<(Vec<CustomerSummaryRow>, i64), DbError> {
    let search = search.filter(|s| !s.trim().is_empty()).map(like_pattern);

    let rows = sqlx::query_as::<_, CustomerSummaryRow>(
        "SELECT c.id, c.email, c.first_name, c.last_name, c.city, c.country, \
                COUNT(o.id) AS order_count, \
                COALESCE(SUM(o.total) FILTER (WHERE o.status NOT IN ('cancelled', 'refunded')), 0) \
                    AS total_spent, \
                MAX(o.created_at) AS last_order_at, \
                c.created_at \
         FROM customers c \
         LEFT JOIN orders o ON o.customer_id = c.id \
         WHERE ($1::TEXT IS NULL OR c.email ILIKE $1 OR c.first_name ILIKE $1 \
                OR c.last_name ILIKE $1) \
         GROUP BY c.id \
         ORDER BY c.created_at DESC, c.id \
         LIMIT $2 OFFSET $3",
    )
    .bind(search.as_deref())
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM customers c \
         WHERE ($1::TEXT IS NULL OR c.email ILIKE $1 OR c.first_name ILIKE $1 \
                OR c.last_name ILIKE $1)",
    )
    .bind(search.as_deref())
    .fetch_one(pool)
    .await?;

    Ok((rows, total))
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_customer(pool: &PgPool, id: Uuid) -> Result<Option<CustomerRow>, DbError> {
    let row = sqlx::query_as::<_, CustomerRow>(&format!(
        "SELECT {COLUMNS} FROM customers WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Admin edit of contact details and the internal note.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has `id`, or [`DbError::Sqlx`] on
/// failure (including an email already used by another customer).
pub async fn update_customer(
    pool: &PgPool,
    id: Uuid,
    input: &CustomerInput<'_>,
    notes: Option<&str>,
) -> Result<CustomerRow, DbError> {
    sqlx::query_as::<_, CustomerRow>(&format!(
        "UPDATE customers \
         SET email = $2, first_name = $3, last_name = $4, phone = $5, street = $6, \
             postal_code = $7, city = $8, country = $9, locale = $10, notes = $11, \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(input.email)
    .bind(input.first_name)
    .bind(input.last_name)
    .bind(input.phone)
    .bind(input.street)
    .bind(input.postal_code)
    .bind(input.city)
    .bind(input.country)
    .bind(input.locale)
    .bind(notes)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
