//! Outbox records.

use chrono::{DateTime, Utc};
use domain::{AGGREGATE_TYPE, OrderEvent};
use serde::{Deserialize, Serialize};

use crate::Result;

/// A stored outbox row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Store-assigned, monotonically increasing id.
    pub id: i64,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,

    /// Set once, when the relay delivered the event.
    pub processed_at: Option<DateTime<Utc>>,

    /// Failed delivery attempts since the last success.
    pub retry_count: i32,
    pub last_error: Option<String>,
}

impl OutboxEvent {
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

/// An outbox row staged in a unit of work, before the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxEvent {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl NewOutboxEvent {
    /// Builds the outbox row for an order event.
    pub fn from_event(event: &OrderEvent) -> Result<Self> {
        Ok(Self {
            aggregate_type: AGGREGATE_TYPE.to_string(),
            aggregate_id: event.aggregate_id().to_string(),
            event_type: event.event_type().to_string(),
            payload: event.payload()?,
        })
    }
}
