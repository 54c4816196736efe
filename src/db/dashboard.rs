//! Aggregate queries for the admin dashboard.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use super::orders::{list_orders, OrderRow};
use super::variants::{list_low_stock, LowStockRow};
use super::{DbError, Page};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct Totals {
    revenue: Decimal,
    revenue_30d: Decimal,
    customers: i64,
    subscribers: i64,
    products_active: i64,
}

/// Everything the dashboard shows, in one struct.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub orders_by_status: Vec<StatusCount>,
    pub revenue: Decimal,
    pub revenue_30d: Decimal,
    pub customers: i64,
    pub subscribers: i64,
    pub products_active: i64,
    pub low_stock: Vec<LowStockRow>,
    pub recent_orders: Vec<OrderRow>,
}

/// Revenue counts every order that was not cancelled or refunded.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any query fails.
pub async fn load_stats(
    pool: &PgPool,
    low_stock_threshold: i32,
    recent_limit: i64,
) -> Result<DashboardStats, DbError> {
    let orders_by_status = sqlx::query_as::<_, StatusCount>(
        "SELECT status, COUNT(*) AS count FROM orders GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await?;

    let totals = sqlx::query_as::<_, Totals>(
        "SELECT \
            (SELECT COALESCE(SUM(total), 0) FROM orders \
             WHERE status NOT IN ('cancelled', 'refunded')) AS revenue, \
            (SELECT COALESCE(SUM(total), 0) FROM orders \
             WHERE status NOT IN ('cancelled', 'refunded') \
               AND created_at >= NOW() - INTERVAL '30 days') AS revenue_30d, \
            (SELECT COUNT(*) FROM customers) AS customers, \
            (SELECT COUNT(*) FROM newsletter_subscribers WHERE active) AS subscribers, \
            (SELECT COUNT(*) FROM products WHERE status = 'active') AS products_active",
    )
    .fetch_one(pool)
    .await?;

    let low_stock = list_low_stock(pool, low_stock_threshold, 20).await?;
    let recent = Page::new(Some(1), u32::try_from(recent_limit).ok());
    let (recent_orders, _) = list_orders(pool, None, None, recent).await?;

    Ok(DashboardStats {
        orders_by_status,
        revenue: totals.revenue,
        revenue_30d: totals.revenue_30d,
        customers: totals.customers,
        subscribers: totals.subscribers,
        products_active: totals.products_active,
        low_stock,
        recent_orders,
    })
}
