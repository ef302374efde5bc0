//! Order lifecycle services.
//!
//! [`OrderOrchestrator`] is the entry point: it creates orders, adds items
//! against the stock ledger, applies coupons, takes payment and cancels, and
//! writes an outbox row with every state change. The catalog, coupon, member
//! and payment services it builds on are usable on their own.

pub mod cache;
pub mod coupon;
pub mod error;
pub mod member;
pub mod orchestrator;
pub mod payment;
pub mod product;

pub use cache::ReadThroughCache;
pub use coupon::{CouponService, coupon_lock_key};
pub use error::{ErrorKind, Result, ShopError};
pub use member::MemberService;
pub use orchestrator::OrderOrchestrator;
pub use payment::{
    GatewayError, GatewayOutcome, InMemoryPaymentGateway, PaymentGateway, PaymentRequest,
    PaymentResult, PaymentService, RetryPolicy, RetryingPaymentGateway,
};
pub use product::{ProductService, stock_lock_key};
