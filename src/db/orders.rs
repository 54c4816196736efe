//! Database operations for `orders`, `order_items` and `order_status_history`.
//!
//! Checkout and status changes each run in one transaction: stock, order rows,
//! history and cart are either all written or not at all.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{
    LineItem, Order, OrderError, OrderHistoryEntry, OrderStatus, OrderTotals, PaymentStatus,
    ShippingPolicy,
};
use crate::domain::value_objects::Money;
use crate::i18n::{Locale, Localized};

use super::customers::{upsert_customer, CustomerInput};
use super::{like_pattern, DbError, Page};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `orders` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub email: String,
    pub status: String,
    pub payment_status: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub street: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    pub locale: String,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax_included: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    /// Rebuilds the aggregate so a status change can be validated.
    pub fn into_order(self, items: &[OrderItemRow]) -> Order {
        let currency = self.currency.clone();
        Order::restore(
            self.id,
            self.order_number,
            self.email,
            OrderStatus::parse(&self.status).unwrap_or_default(),
            PaymentStatus::parse(&self.payment_status).unwrap_or_default(),
            items.iter().map(|i| i.to_line_item(&currency)).collect(),
            OrderTotals {
                subtotal: self.subtotal,
                shipping: self.shipping,
                total: self.total,
                tax_included: self.tax_included,
            },
        )
    }
}

/// A row from the `order_items` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub sku: String,
    pub size: String,
    pub color: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl OrderItemRow {
    fn to_line_item(&self, currency: &str) -> LineItem {
        LineItem {
            variant_id: self.variant_id,
            product_name: self.product_name.clone(),
            sku: self.sku.clone(),
            size: self.size.clone(),
            color: self.color.clone(),
            quantity: u32::try_from(self.quantity).unwrap_or(0),
            unit_price: Money::new(self.unit_price, currency),
        }
    }
}

/// A row from the `order_status_history` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct HistoryRow {
    pub id: i64,
    pub from_status: Option<String>,
    pub to_status: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An order with its line items and status history, oldest entry first.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderRow,
    pub items: Vec<OrderItemRow>,
    pub history: Vec<HistoryRow>,
}

/// Cart line locked for checkout.
#[derive(Debug, Clone, sqlx::FromRow)]
struct CheckoutLineRow {
    variant_id: Uuid,
    quantity: i32,
    product_id: Uuid,
    sku: String,
    size: String,
    color: String,
    stock: i32,
    variant_active: bool,
    product_status: String,
    unit_price: Decimal,
    name_de: String,
    name_en: String,
    name_ar: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of the transactional order writes.
#[derive(Debug, Error)]
pub enum OrderWriteError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("{sku} is no longer available")]
    Unavailable { sku: String },
    #[error("only {available} of {sku} left in stock")]
    InsufficientStock { sku: String, available: u32 },
    #[error("order not found")]
    NotFound,
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for OrderWriteError {
    fn from(e: sqlx::Error) -> Self {
        Self::Db(DbError::Sqlx(e))
    }
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

/// Everything needed to turn a cart into an order.
#[derive(Debug, Clone)]
pub struct CheckoutInput<'a> {
    pub session_id: &'a str,
    pub customer: CustomerInput<'a>,
    pub locale: Locale,
    pub notes: Option<&'a str>,
    pub currency: &'a str,
    pub shipping: ShippingPolicy,
    pub vat_rate: Decimal,
}

/// Places an order from the session's cart.
///
/// Variant rows are locked `FOR UPDATE` in id order, so concurrent checkouts
/// of the same variant serialize and stock never goes negative. Prices and
/// stock are read from the database, never from the client.
///
/// The returned order still carries its `OrderPlaced` event.
///
/// # Errors
///
/// Returns [`OrderWriteError::EmptyCart`], [`OrderWriteError::Unavailable`] or
/// [`OrderWriteError::InsufficientStock`] when the cart cannot be fulfilled,
/// and [`OrderWriteError::Db`] on database failure. Nothing is written on error.
pub async fn place_order(
    pool: &PgPool,
    input: &CheckoutInput<'_>,
) -> Result<Order, OrderWriteError> {
    let mut tx = pool.begin().await?;

    let lines = sqlx::query_as::<_, CheckoutLineRow>(
        "SELECT c.variant_id, c.quantity, v.product_id, v.sku, v.size, v.color, v.stock, \
                v.active AS variant_active, p.status AS product_status, \
                COALESCE(v.price_override, p.price) AS unit_price, \
                p.name_de, p.name_en, p.name_ar \
         FROM cart_items c \
         JOIN product_variants v ON v.id = c.variant_id \
         JOIN products p ON p.id = v.product_id \
         WHERE c.session_id = $1 \
         ORDER BY v.id \
         FOR UPDATE OF v",
    )
    .bind(input.session_id)
    .fetch_all(&mut *tx)
    .await?;

    if lines.is_empty() {
        return Err(OrderWriteError::EmptyCart);
    }

    let mut items = Vec::with_capacity(lines.len());
    for line in &lines {
        if !line.variant_active || line.product_status != "active" {
            return Err(OrderWriteError::Unavailable { sku: line.sku.clone() });
        }
        if line.quantity > line.stock {
            return Err(OrderWriteError::InsufficientStock {
                sku: line.sku.clone(),
                available: u32::try_from(line.stock).unwrap_or(0),
            });
        }
        let name = Localized::new(&line.name_de, &line.name_en, &line.name_ar);
        items.push(LineItem {
            variant_id: Some(line.variant_id),
            product_name: name.get(input.locale).to_string(),
            sku: line.sku.clone(),
            size: line.size.clone(),
            color: line.color.clone(),
            quantity: u32::try_from(line.quantity).unwrap_or(0),
            unit_price: Money::new(line.unit_price, input.currency),
        });
    }

    let order = Order::place(input.customer.email, items, &input.shipping, input.vat_rate)?;
    let customer_id = upsert_customer(&mut tx, &input.customer).await?;
    let totals = order.totals();

    sqlx::query(
        "INSERT INTO orders \
            (id, order_number, customer_id, email, status, payment_status, first_name, last_name, \
             phone, street, postal_code, city, country, locale, subtotal, shipping, tax_included, \
             total, currency, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
                 $18, $19, $20)",
    )
    .bind(order.id())
    .bind(order.order_number())
    .bind(customer_id)
    .bind(order.email())
    .bind(order.status().as_str())
    .bind(order.payment().as_str())
    .bind(input.customer.first_name)
    .bind(input.customer.last_name)
    .bind(input.customer.phone)
    .bind(input.customer.street)
    .bind(input.customer.postal_code)
    .bind(input.customer.city)
    .bind(input.customer.country)
    .bind(input.locale.as_str())
    .bind(totals.subtotal)
    .bind(totals.shipping)
    .bind(totals.tax_included)
    .bind(totals.total)
    .bind(input.currency)
    .bind(input.notes)
    .execute(&mut *tx)
    .await?;

    for (line, item) in lines.iter().zip(order.items()) {
        sqlx::query(
            "INSERT INTO order_items \
                (id, order_id, product_id, variant_id, product_name, sku, size, color, quantity, \
                 unit_price, line_total) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(Uuid::now_v7())
        .bind(order.id())
        .bind(line.product_id)
        .bind(line.variant_id)
        .bind(&item.product_name)
        .bind(&item.sku)
        .bind(&item.size)
        .bind(&item.color)
        .bind(line.quantity)
        .bind(item.unit_price.amount())
        .bind(item.line_total().amount())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE product_variants SET stock = stock - $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(line.variant_id)
        .bind(line.quantity)
        .execute(&mut *tx)
        .await?;
    }

    insert_history(&mut tx, order.id(), &order.opening_entry()).await?;

    sqlx::query("DELETE FROM cart_items WHERE session_id = $1")
        .bind(input.session_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!(
        order_id = %order.id(),
        order_number = order.order_number(),
        total = %order.totals().total,
        "order placed"
    );
    Ok(order)
}

// ---------------------------------------------------------------------------
// Status changes
// ---------------------------------------------------------------------------

/// Moves an order to `to`, writing the history row and, for cancellations and
/// refunds, returning the items to stock. `mark_paid` records the payment
/// with the move and is refused for cancellations and refunds.
///
/// The returned order carries its `OrderStatusChanged` event.
///
/// # Errors
///
/// Returns [`OrderWriteError::NotFound`] for an unknown order,
/// [`OrderWriteError::Order`] for a transition the state machine rejects, and
/// [`OrderWriteError::Db`] on database failure.
pub async fn apply_status_change(
    pool: &PgPool,
    order_id: Uuid,
    to: OrderStatus,
    note: Option<String>,
    mark_paid: bool,
) -> Result<Order, OrderWriteError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(order_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(OrderWriteError::NotFound)?;

    let items = sqlx::query_as::<_, OrderItemRow>(&format!(
        "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
    ))
    .bind(order_id)
    .fetch_all(&mut *tx)
    .await?;

    let mut order = row.into_order(&items);
    let change = if mark_paid {
        order.pay_and_transition(to, note)?
    } else {
        order.transition(to, note)?
    };

    sqlx::query(
        "UPDATE orders SET status = $2, payment_status = $3, updated_at = NOW() WHERE id = $1",
    )
    .bind(order_id)
    .bind(order.status().as_str())
    .bind(change.payment.as_str())
    .execute(&mut *tx)
    .await?;

    insert_history(&mut tx, order_id, &change.entry).await?;

    for (variant_id, quantity) in &change.restock {
        sqlx::query(
            "UPDATE product_variants SET stock = stock + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(variant_id)
        .bind(i32::try_from(*quantity).unwrap_or(i32::MAX))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    tracing::info!(
        order_id = %order_id,
        from = ?change.entry.from_status,
        status = %to,
        restocked = change.restock.len(),
        "order status changed"
    );
    Ok(order)
}

async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    entry: &OrderHistoryEntry,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO order_status_history (order_id, from_status, to_status, note, created_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(order_id)
    .bind(entry.from_status.map(|s| s.as_str()))
    .bind(entry.to_status.as_str())
    .bind(entry.note.as_deref())
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

const ORDER_COLUMNS: &str = "id, order_number, customer_id, email, status, payment_status, \
     first_name, last_name, phone, street, postal_code, city, country, locale, subtotal, \
     shipping, tax_included, total, currency, notes, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, variant_id, product_name, sku, size, \
     color, quantity, unit_price, line_total";

/// One page of orders, newest first, with the total number of matches.
/// `search` matches the order number, email and last name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn list_orders(
    pool: &PgPool,
    status: Option<OrderStatus>,
    search: Option<&str>,
    page: Page,
) -> Result<(Vec<OrderRow>, i64), DbError> {
    let status = status.map(|s| s.as_str());
    let search = search.filter(|s| !s.trim().is_empty()).map(like_pattern);

    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders \
         WHERE ($1::TEXT IS NULL OR status = $1) \
           AND ($2::TEXT IS NULL OR order_number ILIKE $2 OR email ILIKE $2 OR last_name ILIKE $2) \
         ORDER BY created_at DESC, id \
         LIMIT $3 OFFSET $4"
    ))
    .bind(status)
    .bind(search.as_deref())
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM orders \
         WHERE ($1::TEXT IS NULL OR status = $1) \
           AND ($2::TEXT IS NULL OR order_number ILIKE $2 OR email ILIKE $2 OR last_name ILIKE $2)",
    )
    .bind(status)
    .bind(search.as_deref())
    .fetch_one(pool)
    .await?;

    Ok((rows, total))
}

/// Orders of one customer, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_customer_orders(
    pool: &PgPool,
    customer_id: Uuid,
) -> Result<Vec<OrderRow>, DbError> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = $1 ORDER BY created_at DESC"
    ))
    .bind(customer_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn get_order(pool: &PgPool, id: Uuid) -> Result<Option<OrderDetail>, DbError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    match row {
        Some(order) => Ok(Some(load_detail(pool, order).await?)),
        None => Ok(None),
    }
}

/// Order tracking lookup. Both the number and the email must match, so an
/// order number alone does not reveal the order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn get_order_by_number(
    pool: &PgPool,
    order_number: &str,
    email: &str,
) -> Result<Option<OrderDetail>, DbError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders \
         WHERE order_number = $1 AND LOWER(email) = LOWER($2)"
    ))
    .bind(order_number.trim().to_uppercase())
    .bind(email.trim())
    .fetch_optional(pool)
    .await?;
    match row {
        Some(order) => Ok(Some(load_detail(pool, order).await?)),
        None => Ok(None),
    }
}

async fn load_detail(pool: &PgPool, order: OrderRow) -> Result<OrderDetail, DbError> {
    let items = sqlx::query_as::<_, OrderItemRow>(&format!(
        "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
    ))
    .bind(order.id)
    .fetch_all(pool)
    .await?;

    let history = sqlx::query_as::<_, HistoryRow>(
        "SELECT id, from_status, to_status, note, created_at \
         FROM order_status_history WHERE order_id = $1 ORDER BY created_at, id",
    )
    .bind(order.id)
    .fetch_all(pool)
    .await?;

    Ok(OrderDetail {
        order,
        items,
        history,
    })
}
