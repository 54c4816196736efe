//! End-to-end database flows. These need a Postgres reachable through
//! `DATABASE_URL`; run them with `cargo test -- --ignored`.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use modehaus::db::{
    self,
    categories::CategoryInput,
    customers::CustomerInput,
    newsletter::SubscribeOutcome,
    cart::CartWriteError,
    images::NewImage,
    orders::{CheckoutInput, OrderWriteError},
    products::ProductInput,
    variants::VariantInput,
    Page,
};
use modehaus::domain::aggregates::{
    CartError, OrderError, OrderStatus, PaymentStatus, ProductStatus, ShippingPolicy,
};
use modehaus::i18n::{Locale, Localized};

const SESSION: &str = "sess-0000000000000000000000000001";

async fn seed_variant(pool: &PgPool, stock: i32) -> (Uuid, Uuid) {
    let name = Localized::new("Leinenbluse", "Linen blouse", "بلوزة كتان");
    let description = Localized::default();
    let product_id = Uuid::now_v7();
    db::products::create_product(
        pool,
        product_id,
        &ProductInput {
            sku: "BLS-01",
            slug: "leinenbluse",
            name: &name,
            description: &description,
            price: Decimal::new(4990, 2),
            compare_at_price: None,
            category_id: None,
            status: ProductStatus::Active,
            featured: false,
        },
    )
    .await
    .expect("insert product");

    let variant = db::variants::create_variant(
        pool,
        product_id,
        &VariantInput {
            sku: "BLS-01-M-WEISS",
            size: "M",
            color: "Weiß",
            stock,
            price_override: None,
            active: true,
        },
    )
    .await
    .expect("insert variant");
    (product_id, variant.id)
}

fn checkout_input() -> CheckoutInput<'static> {
    CheckoutInput {
        session_id: SESSION,
        customer: CustomerInput {
            email: "lena@example.de",
            first_name: "Lena",
            last_name: "Vogel",
            phone: None,
            street: "Kastanienallee 7",
            postal_code: "10435",
            city: "Berlin",
            country: "DE",
            locale: "de",
        },
        locale: Locale::De,
        notes: None,
        currency: "EUR",
        shipping: ShippingPolicy {
            flat_rate: Decimal::new(495, 2),
            free_threshold: Decimal::new(100, 0),
        },
        vat_rate: Decimal::new(19, 0),
    }
}

async fn stock_of(pool: &PgPool, variant_id: Uuid) -> i32 {
    db::variants::get_variant(pool, variant_id)
        .await
        .expect("load variant")
        .expect("variant exists")
        .stock
}

#[ignore = "requires Postgres"]
#[sqlx::test(migrations = "./migrations")]
async fn checkout_takes_stock_and_empties_the_cart(pool: PgPool) {
    let (_, variant_id) = seed_variant(&pool, 3).await;
    add_to_cart(&pool, variant_id, 2).await.expect("add to cart");

    let order = db::orders::place_order(&pool, &checkout_input())
        .await
        .expect("place order");

    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.totals().subtotal, Decimal::new(9980, 2));
    assert_eq!(order.totals().shipping, Decimal::new(495, 2));
    assert_eq!(order.totals().total, Decimal::new(10475, 2));
    assert_eq!(stock_of(&pool, variant_id).await, 1);
    assert!(db::cart::get_cart_lines(&pool, SESSION)
        .await
        .expect("cart lines")
        .is_empty());

    let detail = db::orders::get_order(&pool, order.id())
        .await
        .expect("load order")
        .expect("order exists");
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].quantity, 2);
    assert_eq!(detail.history.len(), 1);
    assert_eq!(detail.history[0].to_status, "pending");
}

#[ignore = "requires Postgres"]
#[sqlx::test(migrations = "./migrations")]
async fn checkout_refuses_more_than_in_stock(pool: PgPool) {
    let (_, variant_id) = seed_variant(&pool, 2).await;
    add_to_cart(&pool, variant_id, 2).await.expect("add to cart");
    sqlx::query("UPDATE product_variants SET stock = 1 WHERE id = $1")
        .bind(variant_id)
        .execute(&pool)
        .await
        .expect("stock sold elsewhere");

    let err = db::orders::place_order(&pool, &checkout_input())
        .await
        .expect_err("stock is short");
    assert!(matches!(
        err,
        OrderWriteError::InsufficientStock { available: 1, .. }
    ));
    assert_eq!(stock_of(&pool, variant_id).await, 1);
    assert_eq!(
        db::cart::get_cart_lines(&pool, SESSION)
            .await
            .expect("cart lines")
            .len(),
        1
    );
}

#[ignore = "requires Postgres"]
#[sqlx::test(migrations = "./migrations")]
async fn empty_cart_cannot_be_checked_out(pool: PgPool) {
    let err = db::orders::place_order(&pool, &checkout_input())
        .await
        .expect_err("nothing to order");
    assert!(matches!(err, OrderWriteError::EmptyCart));
}

#[ignore = "requires Postgres"]
#[sqlx::test(migrations = "./migrations")]
async fn cancelling_returns_items_to_stock(pool: PgPool) {
    let (_, variant_id) = seed_variant(&pool, 5).await;
    add_to_cart(&pool, variant_id, 2).await.expect("add to cart");
    let order = db::orders::place_order(&pool, &checkout_input())
        .await
        .expect("place order");
    assert_eq!(stock_of(&pool, variant_id).await, 3);

    let err = db::orders::apply_status_change(&pool, order.id(), OrderStatus::Cancelled, None, true)
        .await
        .expect_err("payment cannot come with a cancellation");
    assert!(matches!(
        err,
        OrderWriteError::Order(OrderError::PaymentOnClosedOrder { to: OrderStatus::Cancelled })
    ));
    assert_eq!(stock_of(&pool, variant_id).await, 3);

    let cancelled = db::orders::apply_status_change(
        &pool,
        order.id(),
        OrderStatus::Cancelled,
        Some("Kundin hat storniert".to_owned()),
        false,
    )
    .await
    .expect("cancel order");
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(cancelled.payment(), PaymentStatus::Pending);
    assert_eq!(stock_of(&pool, variant_id).await, 5);

    let detail = db::orders::get_order(&pool, order.id())
        .await
        .expect("load order")
        .expect("order exists");
    assert_eq!(detail.history.len(), 2);
    assert_eq!(detail.history[1].from_status.as_deref(), Some("pending"));
    assert_eq!(detail.history[1].to_status, "cancelled");

    let err = db::orders::apply_status_change(&pool, order.id(), OrderStatus::Shipped, None, false)
        .await
        .expect_err("cancelled is terminal");
    assert!(matches!(err, OrderWriteError::Order(_)));
    assert_eq!(stock_of(&pool, variant_id).await, 5);
}

async fn add_to_cart(pool: &PgPool, variant_id: Uuid, quantity: u32) -> Result<u32, CartWriteError> {
    let cart = db::cart::change_line(pool, SESSION, variant_id, Locale::De, "EUR", |cart, mut item| {
        item.quantity = quantity;
        cart.add_item(item).map(|_| ())
    })
    .await?;
    Ok(cart.quantity_of(variant_id))
}

#[ignore = "requires Postgres"]
#[sqlx::test(migrations = "./migrations")]
async fn concurrent_adds_to_one_line_both_count(pool: PgPool) {
    let (_, variant_id) = seed_variant(&pool, 10).await;

    let (a, b) = tokio::join!(
        add_to_cart(&pool, variant_id, 2),
        add_to_cart(&pool, variant_id, 3)
    );
    a.expect("first add");
    b.expect("second add");

    let lines = db::cart::get_cart_lines(&pool, SESSION).await.expect("cart lines");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 5);
}

#[ignore = "requires Postgres"]
#[sqlx::test(migrations = "./migrations")]
async fn concurrent_adds_cannot_exceed_stock(pool: PgPool) {
    let (_, variant_id) = seed_variant(&pool, 4).await;

    let (a, b) = tokio::join!(
        add_to_cart(&pool, variant_id, 3),
        add_to_cart(&pool, variant_id, 3)
    );
    let refused = [a, b]
        .into_iter()
        .filter(|r| matches!(r, Err(CartWriteError::Cart(CartError::InsufficientStock { available: 4 }))))
        .count();
    assert_eq!(refused, 1);

    let lines = db::cart::get_cart_lines(&pool, SESSION).await.expect("cart lines");
    assert_eq!(lines[0].quantity, 3);
}

#[ignore = "requires Postgres"]
#[sqlx::test(migrations = "./migrations")]
async fn setting_a_line_to_zero_removes_it(pool: PgPool) {
    let (_, variant_id) = seed_variant(&pool, 4).await;
    add_to_cart(&pool, variant_id, 2).await.expect("add");

    let cart = db::cart::change_line(&pool, SESSION, variant_id, Locale::De, "EUR", |cart, _| {
        cart.update_quantity(variant_id, 0)
    })
    .await
    .expect("set to zero");
    assert!(cart.is_empty());
    assert!(db::cart::get_cart_lines(&pool, SESSION).await.expect("cart lines").is_empty());

    let err = db::cart::change_line(&pool, SESSION, Uuid::now_v7(), Locale::De, "EUR", |_, _| Ok(()))
        .await
        .expect_err("unknown variant");
    assert!(matches!(err, CartWriteError::VariantNotFound));
}

async fn upload(pool: &PgPool, product_id: Uuid, stem: &str) -> Result<db::images::ImageRow, db::DbError> {
    let url = format!("/media/products/{product_id}/{stem}.webp");
    let thumb_url = format!("/media/products/{product_id}/{stem}_thumb.webp");
    db::images::insert_image(
        pool,
        &NewImage {
            id: Uuid::now_v7(),
            product_id,
            file_stem: stem,
            url: &url,
            thumb_url: &thumb_url,
            width: 1200,
            height: 1600,
            alt_text: None,
        },
    )
    .await
}

#[ignore = "requires Postgres"]
#[sqlx::test(migrations = "./migrations")]
async fn concurrent_first_uploads_elect_one_primary(pool: PgPool) {
    let (product_id, _) = seed_variant(&pool, 1).await;

    let (a, b) = tokio::join!(upload(&pool, product_id, "front"), upload(&pool, product_id, "back"));
    let (a, b) = (a.expect("first upload"), b.expect("second upload"));
    assert_ne!(a.is_primary, b.is_primary);
    assert_ne!(a.position, b.position);

    let images = db::images::list_images(&pool, product_id).await.expect("list");
    assert_eq!(images.iter().filter(|i| i.is_primary).count(), 1);

    let err = upload(&pool, Uuid::now_v7(), "ghost").await.expect_err("unknown product");
    assert!(matches!(err, db::DbError::NotFound));
}

#[ignore = "requires Postgres"]
#[sqlx::test(migrations = "./migrations")]
async fn resubscribing_reactivates_the_same_row(pool: PgPool) {
    let first = db::newsletter::subscribe(&pool, "noor@example.com", "ar")
        .await
        .expect("subscribe");
    assert_eq!(first, SubscribeOutcome::New);
    let again = db::newsletter::subscribe(&pool, "noor@example.com", "ar")
        .await
        .expect("subscribe again");
    assert_eq!(again, SubscribeOutcome::AlreadySubscribed);

    let (rows, total) = db::newsletter::list_subscribers(&pool, None, None, Page::new(None, None))
        .await
        .expect("list");
    assert_eq!(total, 1);
    assert!(db::newsletter::unsubscribe(&pool, &rows[0].token)
        .await
        .expect("unsubscribe"));
    assert!(!db::newsletter::unsubscribe(&pool, &rows[0].token)
        .await
        .expect("unsubscribe twice"));

    let back = db::newsletter::subscribe(&pool, "noor@example.com", "de")
        .await
        .expect("resubscribe");
    assert_eq!(back, SubscribeOutcome::Reactivated);
    assert_eq!(db::newsletter::count_active(&pool).await.expect("count"), 1);
}

#[ignore = "requires Postgres"]
#[sqlx::test(migrations = "./migrations")]
async fn category_with_products_reports_dependents(pool: PgPool) {
    let name = Localized::new("Kleider", "Dresses", "فساتين");
    let category = db::categories::create_category(
        &pool,
        &CategoryInput {
            parent_id: None,
            slug: "kleider",
            name: &name,
            position: 0,
            active: true,
        },
    )
    .await
    .expect("insert category");

    let (product_id, _) = seed_variant(&pool, 1).await;
    sqlx::query("UPDATE products SET category_id = $2 WHERE id = $1")
        .bind(product_id)
        .bind(category.id)
        .execute(&pool)
        .await
        .expect("assign category");

    let (children, products) = db::categories::count_dependents(&pool, category.id)
        .await
        .expect("count");
    assert_eq!((children, products), (0, 1));
}

#[ignore = "requires Postgres"]
#[sqlx::test(migrations = "./migrations")]
async fn admin_session_round_trip(pool: PgPool) {
    let (token, expires_at) =
        db::admin_sessions::create_session(&pool, "admin", chrono::Duration::hours(1))
            .await
            .expect("create session");
    assert!(expires_at > chrono::Utc::now());

    let session = db::admin_sessions::find_valid_session(&pool, &token)
        .await
        .expect("lookup")
        .expect("session is valid");
    assert_eq!(session.username, "admin");
    assert_ne!(session.token_hash, token);

    assert!(db::admin_sessions::delete_session(&pool, &token)
        .await
        .expect("logout"));
    assert!(db::admin_sessions::find_valid_session(&pool, &token)
        .await
        .expect("lookup")
        .is_none());
}
