//! Domain layer for the shop order core.
//!
//! This crate holds the pure business types:
//! - the Order aggregate with its status machine and outbox events
//! - catalog products with the stock counter
//! - discount coupons and members
//!
//! Nothing here performs I/O; persistence and locking live in other crates.

pub mod coupon;
pub mod member;
pub mod money;
pub mod order;
pub mod product;

pub use coupon::{Coupon, CouponError, CouponStatus, DiscountType};
pub use member::{Member, MemberRole};
pub use money::Money;
pub use order::{
    AGGREGATE_TYPE, IdempotencyKey, Order, OrderCancelledData, OrderCreatedData, OrderError,
    OrderEvent, OrderItem, OrderNumber, OrderStatus, PAYMENT_METHOD_CARD, PaymentCompletedData,
};
pub use product::{Product, ProductStatus, StockError};
