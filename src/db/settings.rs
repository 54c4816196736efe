//! Database operations for the `site_settings` key/value table.

use std::collections::HashMap;

use sqlx::PgPool;

use super::DbError;

/// Every stored setting as a `key -> value` map.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_all(pool: &PgPool) -> Result<HashMap<String, String>, DbError> {
    let rows = sqlx::query_as::<_, (String, String)>("SELECT key, value FROM site_settings")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Writes all pairs in one transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any upsert fails; nothing is written in that case.
pub async fn upsert_many(pool: &PgPool, pairs: &[(String, String)]) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    for (key, value) in pairs {
        sqlx::query(
            "INSERT INTO site_settings (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}
