//! Order aggregate and related types.

mod aggregate;
mod events;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use events::{
    AGGREGATE_TYPE, OrderCancelledData, OrderCreatedData, OrderEvent, PAYMENT_METHOD_CARD,
    PaymentCompletedData,
};
pub use state::OrderStatus;
pub use value_objects::{IdempotencyKey, OrderItem, OrderNumber};

use thiserror::Error;

/// Errors raised by order state changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The order is not in a status that allows the action.
    #[error("Invalid order status: cannot {action} from {current} status")]
    InvalidStatus {
        current: OrderStatus,
        action: &'static str,
    },

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// A line or order total does not fit the money representation.
    #[error("Order amount out of range")]
    AmountOverflow,
}
