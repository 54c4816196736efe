//! Database operations for the `newsletter_subscribers` table.

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::{like_pattern, DbError, Page};

/// A row from the `newsletter_subscribers` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SubscriberRow {
    pub id: Uuid,
    pub email: String,
    pub locale: String,
    #[serde(skip)]
    pub token: String,
    pub active: bool,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    New,
    Reactivated,
    AlreadySubscribed,
}

impl SubscribeOutcome {
    /// True when the address was not an active subscriber before.
    #[must_use]
    pub fn is_new(self) -> bool {
        !matches!(self, Self::AlreadySubscribed)
    }
}

fn unsubscribe_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Subscribes `email`, re-activating a previous unsubscription. The
/// unsubscribe token of an existing address is kept.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn subscribe(pool: &PgPool, email: &str, locale: &str) -> Result<SubscribeOutcome, DbError> {
    let previous = sqlx::query_scalar::<_, Option<bool>>(
        "WITH prev AS (SELECT active FROM newsletter_subscribers WHERE email = $2) \
         INSERT INTO newsletter_subscribers (id, email, locale, token) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (email) DO UPDATE \
         SET active = TRUE, locale = EXCLUDED.locale, unsubscribed_at = NULL, \
             subscribed_at = CASE WHEN newsletter_subscribers.active \
                                  THEN newsletter_subscribers.subscribed_at ELSE NOW() END \
         RETURNING (SELECT active FROM prev)",
    )
    .bind(Uuid::now_v7())
    .bind(email)
    .bind(locale)
    .bind(unsubscribe_token())
    .fetch_one(pool)
    .await?;

    Ok(match previous {
        None => SubscribeOutcome::New,
        Some(false) => SubscribeOutcome::Reactivated,
        Some(true) => SubscribeOutcome::AlreadySubscribed,
    })
}

/// Returns `true` if an active subscription was ended.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn unsubscribe(pool: &PgPool, token: &str) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE newsletter_subscribers SET active = FALSE, unsubscribed_at = NOW() \
         WHERE token = $1 AND active",
    )
    .bind(token)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// One page of subscribers, newest first. `active` filters by state.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn list_subscribers(
    pool: &PgPool,
    active: Option<bool>,
    search: Option<&str>,
    page: Page,
) -> Result<(Vec<SubscriberRow>, i64), DbError> {
    let search = search.filter(|s| !s.trim().is_empty()).map(like_pattern);

    let rows = sqlx::query_as::<_, SubscriberRow>(
        "SELECT id, email, locale, token, active, subscribed_at, unsubscribed_at \
         FROM newsletter_subscribers \
         WHERE ($1::BOOLEAN IS NULL OR active = $1) AND ($2::TEXT IS NULL OR email ILIKE $2) \
         ORDER BY subscribed_at DESC, id \
         LIMIT $3 OFFSET $4",
    )
    .bind(active)
    .bind(search.as_deref())
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM newsletter_subscribers \
         WHERE ($1::BOOLEAN IS NULL OR active = $1) AND ($2::TEXT IS NULL OR email ILIKE $2)",
    )
    .bind(active)
    .bind(search.as_deref())
    .fetch_one(pool)
    .await?;

    Ok((rows, total))
}

/// Returns `true` if a row was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_subscriber(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM newsletter_subscribers WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_active(pool: &PgPool) -> Result<i64, DbError> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM newsletter_subscribers WHERE active")
            .fetch_one(pool)
            .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsubscribe_tokens_are_random_alphanumerics() {
        let a = unsubscribe_token();
        let b = unsubscribe_token();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn only_already_subscribed_is_not_new() {
        assert!(SubscribeOutcome::New.is_new());
        assert!(SubscribeOutcome::Reactivated.is_new());
        assert!(!SubscribeOutcome::AlreadySubscribed.is_new());
    }
}
