//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and need Docker, so they are
//! ignored by default. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{MemberId, ProductId};
use domain::{
    Coupon, DiscountType, IdempotencyKey, Member, Money, Order, OrderEvent, OrderItem,
    OrderStatus, Product, ProductStatus,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    COUPON_CODE_CONSTRAINT, CouponRepository, MEMBER_EMAIL_CONSTRAINT, MemberRepository,
    ORDER_IDEMPOTENCY_KEY_CONSTRAINT, OrderRepository, OutboxStore, PostgresShopStore,
    ProductRepository, StoreError, atomically,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/001_create_shop_tables.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresShopStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE orders, outbox_events, products, coupons, members, distributed_locks RESTART IDENTITY",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresShopStore::new(pool)
}

async fn create_order(store: &PostgresShopStore, key: Option<&str>) -> Result<Order, StoreError> {
    let mut order = Order::place(MemberId::new(), IdempotencyKey::parse(key));
    atomically(store, |uow| {
        uow.save_order(&mut order);
        uow.record(&OrderEvent::created(&order))?;
        Ok::<_, StoreError>(())
    })
    .await?;
    Ok(order)
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn order_and_outbox_commit_together() {
    let store = get_test_store().await;
    let order = create_order(&store, Some("pg-key")).await.unwrap();

    let loaded = store.find_order(order.id()).await.unwrap().unwrap();
    assert_eq!(loaded, order);

    let key = IdempotencyKey::parse(Some("pg-key")).unwrap();
    let by_key = store.find_order_by_idempotency_key(&key).await.unwrap();
    assert_eq!(by_key.map(|o| o.id()), Some(order.id()));

    let events = store
        .events_for_aggregate(&order.id().to_string())
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "OrderCreated");
    assert_eq!(events[0].aggregate_type, "Order");
    assert_eq!(events[0].retry_count, 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn duplicate_idempotency_key_rolls_back() {
    let store = get_test_store().await;
    create_order(&store, Some("same")).await.unwrap();

    let err = create_order(&store, Some("same")).await.unwrap_err();
    assert_eq!(err.unique_constraint(), Some(ORDER_IDEMPOTENCY_KEY_CONSTRAINT));

    let pending = store.fetch_unprocessed(100, 5).await.unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn stale_order_update_conflicts() {
    let store = get_test_store().await;
    let order = create_order(&store, None).await.unwrap();

    let mut winner = store.find_order(order.id()).await.unwrap().unwrap();
    let mut loser = winner.clone();

    winner
        .add_item(OrderItem::new(ProductId::new(), "Cup", Money::new(700), 1))
        .unwrap();
    atomically(&store, |uow| {
        uow.save_order(&mut winner);
        Ok::<_, StoreError>(())
    })
    .await
    .unwrap();

    loser.cancel().unwrap();
    let err = atomically(&store, |uow| {
        uow.save_order(&mut loser);
        uow.record(&OrderEvent::cancelled(&loser, "race"))?;
        Ok::<_, StoreError>(())
    })
    .await
    .unwrap_err();
    assert!(err.is_conflict());

    let stored = store.find_order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Pending);
    assert_eq!(stored.version(), 2);
    assert_eq!(stored.items().len(), 1);
    let events = store
        .events_for_aggregate(&order.id().to_string())
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn outbox_failure_and_success_bookkeeping() {
    let store = get_test_store().await;
    create_order(&store, None).await.unwrap();
    create_order(&store, None).await.unwrap();

    let batch = store.fetch_unprocessed(100, 5).await.unwrap();
    assert_eq!(batch.len(), 2);
    assert!(batch[0].id < batch[1].id);

    let first = batch[0].id;
    store.mark_failed(first, "connection reset").await.unwrap();
    let retried = store.fetch_unprocessed(100, 5).await.unwrap();
    assert_eq!(retried[0].retry_count, 1);
    assert_eq!(retried[0].last_error.as_deref(), Some("connection reset"));

    // Excluded once the attempt budget is spent.
    assert_eq!(store.fetch_unprocessed(100, 1).await.unwrap().len(), 1);

    store.mark_processed(first).await.unwrap();
    let remaining = store.fetch_unprocessed(100, 5).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0].id, first);

    assert!(matches!(
        store.mark_processed(999_999).await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn product_roundtrip_and_category_lookup() {
    let store = get_test_store().await;
    let mut lamp = Product::new("Lamp", Some("desk".into()), Money::new(3000), 1, "home");
    store.save_product(&lamp).await.unwrap();

    lamp.decrement_stock(1).unwrap();
    store.save_product(&lamp).await.unwrap();

    let loaded = store.find_product(lamp.id).await.unwrap().unwrap();
    assert_eq!(loaded.stock_quantity, 0);
    assert_eq!(loaded.status, ProductStatus::OutOfStock);
    assert_eq!(loaded.description.as_deref(), Some("desk"));

    assert_eq!(store.find_products_by_category("home").await.unwrap().len(), 1);
    assert!(store.find_products_by_category("garden").await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn coupon_codes_and_active_window() {
    let store = get_test_store().await;
    let now = Utc::now();
    let coupon = Coupon::new(
        "SPRING",
        "Spring sale",
        DiscountType::Percentage,
        15,
        Money::new(10_000),
        now - Duration::days(1),
        now + Duration::days(1),
    )
    .with_quantity(3)
    .with_max_discount(Money::new(4_000));
    store.save_coupon(&coupon).await.unwrap();

    let by_code = store.find_coupon_by_code("SPRING").await.unwrap().unwrap();
    assert_eq!(by_code.id, coupon.id);
    assert_eq!(by_code.remaining_quantity, Some(3));
    assert_eq!(by_code.max_discount_amount, Some(Money::new(4_000)));

    assert_eq!(store.active_coupons(now).await.unwrap().len(), 1);
    assert!(
        store
            .active_coupons(now + Duration::days(2))
            .await
            .unwrap()
            .is_empty()
    );

    let clash = Coupon::new(
        "SPRING",
        "Copy",
        DiscountType::Fixed,
        100,
        Money::zero(),
        now,
        now,
    );
    let err = store.save_coupon(&clash).await.unwrap_err();
    assert_eq!(err.unique_constraint(), Some(COUPON_CODE_CONSTRAINT));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn member_email_uniqueness() {
    let store = get_test_store().await;
    let member = Member::new("lee@example.com", "lee");
    store.save_member(&member).await.unwrap();

    let found = store
        .find_member_by_email("lee@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, member.id);

    let err = store
        .save_member(&Member::new("lee@example.com", "other"))
        .await
        .unwrap_err();
    assert_eq!(err.unique_constraint(), Some(MEMBER_EMAIL_CONSTRAINT));
}
