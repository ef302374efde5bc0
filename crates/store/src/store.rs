use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CouponId, MemberId, OrderId, ProductId};
use domain::{Coupon, IdempotencyKey, Member, Order, Product};

use crate::outbox::OutboxEvent;
use crate::unit_of_work::UnitOfWork;
use crate::Result;

/// Constraint reported when two orders claim the same idempotency key.
pub const ORDER_IDEMPOTENCY_KEY_CONSTRAINT: &str = "orders_idempotency_key_key";

/// Constraint reported when two orders draw the same order number.
pub const ORDER_NUMBER_CONSTRAINT: &str = "orders_order_number_key";

/// Constraint reported when two members share an email address.
pub const MEMBER_EMAIL_CONSTRAINT: &str = "members_email_key";

/// Constraint reported when two coupons share a code.
pub const COUPON_CODE_CONSTRAINT: &str = "coupons_code_key";

/// Read access to orders. Order writes go through [`Transactional::commit`].
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Finds the order holding `key`, whatever its status.
    async fn find_order_by_idempotency_key(&self, key: &IdempotencyKey)
    -> Result<Option<Order>>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>>;

    async fn find_products_by_category(&self, category: &str) -> Result<Vec<Product>>;

    async fn all_products(&self) -> Result<Vec<Product>>;

    /// Inserts or replaces a product.
    async fn save_product(&self, product: &Product) -> Result<()>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn find_coupon(&self, id: CouponId) -> Result<Option<Coupon>>;

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;

    /// Returns coupons with `ACTIVE` status whose validity window contains `now`.
    async fn active_coupons(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>>;

    /// Inserts or replaces a coupon. Codes are unique.
    async fn save_coupon(&self, coupon: &Coupon) -> Result<()>;
}

#[async_trait]
pub trait MemberRepository: Send + Sync {
    async fn find_member(&self, id: MemberId) -> Result<Option<Member>>;

    async fn find_member_by_email(&self, email: &str) -> Result<Option<Member>>;

    /// Inserts or replaces a member. Emails are unique.
    async fn save_member(&self, member: &Member) -> Result<()>;
}

/// Relay-side access to the outbox.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns up to `limit` unprocessed events with fewer than `max_attempts`
    /// failed deliveries, oldest first (creation time, then id).
    async fn fetch_unprocessed(&self, limit: usize, max_attempts: i32)
    -> Result<Vec<OutboxEvent>>;

    /// Marks an event delivered and clears its failure state.
    async fn mark_processed(&self, id: i64) -> Result<()>;

    /// Records a failed delivery attempt.
    async fn mark_failed(&self, id: i64, error: &str) -> Result<()>;

    /// Returns every event of an aggregate in id order, processed or not.
    async fn events_for_aggregate(&self, aggregate_id: &str) -> Result<Vec<OutboxEvent>>;
}

/// Applies a [`UnitOfWork`] atomically.
#[async_trait]
pub trait Transactional: Send + Sync {
    /// Commits every staged write, or none of them.
    ///
    /// Fails with [`StoreError::ConcurrencyConflict`](crate::StoreError) when a
    /// staged order's expected version no longer matches, and with
    /// [`StoreError::UniqueViolation`](crate::StoreError) when a uniqueness
    /// constraint rejects a row.
    async fn commit(&self, uow: UnitOfWork) -> Result<()>;
}

/// Everything the order core needs from persistence.
pub trait ShopStore:
    OrderRepository
    + ProductRepository
    + CouponRepository
    + MemberRepository
    + OutboxStore
    + Transactional
{
}

impl<T> ShopStore for T where
    T: OrderRepository
        + ProductRepository
        + CouponRepository
        + MemberRepository
        + OutboxStore
        + Transactional
{
}
