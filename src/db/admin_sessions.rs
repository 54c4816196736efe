//! Database operations for the `admin_sessions` table.
//!
//! The bearer token is handed to the client once; only its SHA-256 is stored.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use super::DbError;

/// A row from the `admin_sessions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdminSessionRow {
    pub token_hash: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Lowercase hex SHA-256 of `input`.
#[must_use]
pub fn sha256_hex(input: &[u8]) -> String {
    Sha256::digest(input)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn new_token() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Creates a session valid for `ttl` and returns the plain token with its expiry.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_session(
    pool: &PgPool,
    username: &str,
    ttl: Duration,
) -> Result<(String, DateTime<Utc>), DbError> {
    let token = new_token();
    let expires_at = Utc::now() + ttl;
    sqlx::query("INSERT INTO admin_sessions (token_hash, username, expires_at) VALUES ($1, $2, $3)")
        .bind(sha256_hex(token.as_bytes()))
        .bind(username)
        .bind(expires_at)
        .execute(pool)
        .await?;
    Ok((token, expires_at))
}

/// The unexpired session for `token`, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_valid_session(
    pool: &PgPool,
    token: &str,
) -> Result<Option<AdminSessionRow>, DbError> {
    let row = sqlx::query_as::<_, AdminSessionRow>(
        "SELECT token_hash, username, created_at, expires_at FROM admin_sessions \
         WHERE token_hash = $1 AND expires_at > NOW()",
    )
    .bind(sha256_hex(token.as_bytes()))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_session(pool: &PgPool, token: &str) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM admin_sessions WHERE token_hash = $1")
        .bind(sha256_hex(token.as_bytes()))
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Removes expired sessions and returns how many were dropped.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn purge_expired(pool: &PgPool) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM admin_sessions WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_digest() {
        assert_eq!(
            sha256_hex(b"password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
    }

    #[test]
    fn tokens_are_64_hex_chars() {
        let token = new_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, new_token());
    }
}
