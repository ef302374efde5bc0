//! Persistence for the shop order core.
//!
//! Order writes and their outbox rows are staged in a [`UnitOfWork`] and
//! committed together; everything else goes through the repository traits.

pub mod error;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod store;
pub mod unit_of_work;

pub use error::{Result, StoreError};
pub use memory::InMemoryShopStore;
pub use outbox::{NewOutboxEvent, OutboxEvent};
pub use postgres::PostgresShopStore;
pub use store::{
    COUPON_CODE_CONSTRAINT, CouponRepository, MEMBER_EMAIL_CONSTRAINT, MemberRepository,
    ORDER_IDEMPOTENCY_KEY_CONSTRAINT, ORDER_NUMBER_CONSTRAINT, OrderRepository, OutboxStore, ProductRepository, ShopStore,
    Transactional,
};
pub use unit_of_work::{StagedOrder, UnitOfWork, atomically};
