//! Caller-facing error type.

use common::{CouponId, OrderId, ProductId};
use distributed_lock::LockError;
use domain::OrderStatus;
use store::StoreError;
use thiserror::Error;

use crate::payment::GatewayError;

/// Coarse classification of a [`ShopError`], stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidState,
    ResourceExhausted,
    /// A dependency is temporarily unavailable; retrying may succeed.
    Unavailable,
    /// The payment processor declined the request.
    Rejected,
    InvalidInput,
    Internal,
}

/// Errors returned by the shop services.
///
/// Internal causes are kept as the error source and are not repeated in the
/// message.
#[derive(Debug, Error)]
pub enum ShopError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Coupon not found: {0}")]
    CouponNotFound(CouponId),

    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("Member already exists: {email}")]
    MemberAlreadyExists { email: String },

    #[error("Coupon code already in use: {code}")]
    CouponCodeTaken { code: String },

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Product is not on sale: {0}")]
    ProductNotActive(ProductId),

    #[error("Invalid order status: cannot {action} order {order_id} in {current} status")]
    InvalidOrderStatus {
        order_id: OrderId,
        current: OrderStatus,
        action: &'static str,
    },

    #[error("Idempotency key already used: {key}")]
    IdempotencyKeyConflict { key: String },

    #[error("Concurrent modification of {entity} {id}")]
    ConcurrentModification { entity: &'static str, id: String },

    /// The processor answered and refused the charge.
    #[error("Payment failed: {reason}")]
    PaymentFailed { reason: String },

    /// The processor could not be reached within the retry budget.
    #[error("Payment gateway unavailable")]
    PaymentUnavailable(#[source] GatewayError),

    #[error("Payment cancellation failed: {reason}")]
    PaymentCancelFailed {
        reason: String,
        #[source]
        source: Option<GatewayError>,
    },

    #[error("Coupon is not available: {0}")]
    CouponNotAvailable(CouponId),

    #[error("Coupon quota exceeded: {0}")]
    CouponQuotaExceeded(CouponId),

    #[error("Lock busy: {key}")]
    LockUnavailable { key: String },

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage failure")]
    Store(#[source] StoreError),

    #[error("Lock backend failure")]
    Lock(#[source] LockError),
}

impl ShopError {
    /// Returns the error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShopError::OrderNotFound(_)
            | ShopError::ProductNotFound(_)
            | ShopError::CouponNotFound(_)
            | ShopError::MemberNotFound(_) => ErrorKind::NotFound,
            ShopError::MemberAlreadyExists { .. }
            | ShopError::CouponCodeTaken { .. }
            | ShopError::IdempotencyKeyConflict { .. }
            | ShopError::ConcurrentModification { .. } => ErrorKind::Conflict,
            ShopError::ProductNotActive(_)
            | ShopError::InvalidOrderStatus { .. }
            | ShopError::CouponNotAvailable(_) => ErrorKind::InvalidState,
            ShopError::InsufficientStock { .. } | ShopError::CouponQuotaExceeded(_) => {
                ErrorKind::ResourceExhausted
            }
            ShopError::PaymentUnavailable(_)
            | ShopError::PaymentCancelFailed { .. }
            | ShopError::LockUnavailable { .. } => ErrorKind::Unavailable,
            ShopError::PaymentFailed { .. } => ErrorKind::Rejected,
            ShopError::InvalidQuantity { .. } | ShopError::InvalidInput(_) => {
                ErrorKind::InvalidInput
            }
            ShopError::Store(_) | ShopError::Lock(_) => ErrorKind::Internal,
        }
    }

    /// Returns the stable short error code.
    pub fn code(&self) -> &'static str {
        match self {
            ShopError::Store(_) | ShopError::Lock(_) => "C001",
            ShopError::InvalidQuantity { .. } | ShopError::InvalidInput(_) => "C002",
            ShopError::CouponCodeTaken { .. } => "C006",
            ShopError::MemberNotFound(_) => "M001",
            ShopError::MemberAlreadyExists { .. } => "M002",
            ShopError::ProductNotFound(_) => "P001",
            ShopError::InsufficientStock { .. } => "P002",
            ShopError::ProductNotActive(_) => "P003",
            ShopError::OrderNotFound(_) => "O001",
            ShopError::PaymentFailed { .. } | ShopError::PaymentUnavailable(_) => "O003",
            ShopError::InvalidOrderStatus { .. } => "O004",
            ShopError::IdempotencyKeyConflict { .. } => "O005",
            ShopError::PaymentCancelFailed { .. } => "O006",
            ShopError::ConcurrentModification { .. } => "O007",
            ShopError::CouponNotFound(_) => "CP001",
            ShopError::CouponNotAvailable(_) => "CP003",
            ShopError::CouponQuotaExceeded(_) => "CP005",
            ShopError::LockUnavailable { .. } => "L001",
        }
    }
}

impl From<StoreError> for ShopError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConcurrencyConflict { entity, id, .. } => {
                ShopError::ConcurrentModification { entity, id }
            }
            other => ShopError::Store(other),
        }
    }
}

impl From<LockError> for ShopError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Unavailable { key, .. } | LockError::LeaseExpired { key } => {
                ShopError::LockUnavailable { key }
            }
            other => ShopError::Lock(other),
        }
    }
}

/// Convenience type alias for shop results.
pub type Result<T> = std::result::Result<T, ShopError>;
