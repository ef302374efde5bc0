//! Reliable delivery of order events.
//!
//! Order changes write their events to the outbox table in the same commit as
//! the order row. [`OutboxRelay`] polls that table and hands each event to an
//! [`EventPublisher`]:
//! - success marks the row processed
//! - failure records the error and retries on a later pass
//! - rows that failed `max_attempts` times stop being fetched

pub mod error;
pub mod publisher;
pub mod relay;

pub use error::{PublishError, RelayError, Result};
pub use publisher::{Delivery, EventPublisher, InMemoryPublisher, LoggingPublisher};
pub use relay::{OutboxRelay, RelayConfig, RelayReport};
