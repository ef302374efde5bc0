//! Downstream publisher port and its in-process implementations.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::OrderEvent;
use serde::Serialize;
use tracing::info;

use crate::error::PublishError;

/// One delivery attempt of an outbox event.
///
/// Delivery is at-least-once; consumers de-duplicate on `event_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub event_id: i64,
    pub aggregate_id: String,
    pub created_at: DateTime<Utc>,
    pub event: OrderEvent,
}

impl Delivery {
    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}

/// Sends decoded events to whoever consumes them downstream.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, delivery: &Delivery) -> Result<(), PublishError>;
}

/// Writes every delivery to the log as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPublisher;

#[async_trait]
impl EventPublisher for LoggingPublisher {
    async fn publish(&self, delivery: &Delivery) -> Result<(), PublishError> {
        let body = serde_json::to_string(delivery)
            .map_err(|e| PublishError::Rejected(e.to_string()))?;
        info!(
            event_id = delivery.event_id,
            event_type = delivery.event_type(),
            aggregate_id = %delivery.aggregate_id,
            %body,
            "Event published"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct State {
    delivered: Vec<Delivery>,
    fail_all: bool,
    failing_aggregates: HashSet<String>,
}

/// Collects deliveries in memory. Failures can be switched on for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<Mutex<State>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fails every publish while set.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state().fail_all = fail;
    }

    /// Fails publishes for one aggregate until [`recover`](Self::recover) is called.
    pub fn fail_for_aggregate(&self, aggregate_id: impl Into<String>) {
        self.state().failing_aggregates.insert(aggregate_id.into());
    }

    pub fn recover(&self) {
        let mut state = self.state();
        state.fail_all = false;
        state.failing_aggregates.clear();
    }

    pub fn delivered(&self) -> Vec<Delivery> {
        self.state().delivered.clone()
    }

    pub fn delivered_ids(&self) -> Vec<i64> {
        self.state().delivered.iter().map(|d| d.event_id).collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, delivery: &Delivery) -> Result<(), PublishError> {
        let mut state = self.state();
        if state.fail_all || state.failing_aggregates.contains(&delivery.aggregate_id) {
            return Err(PublishError::Unavailable("broker offline".into()));
        }
        state.delivered.push(delivery.clone());
        Ok(())
    }
}
