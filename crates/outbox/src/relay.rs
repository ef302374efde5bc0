//! Polling relay from the outbox table to the downstream publisher.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::OrderEvent;
use store::{OutboxEvent, OutboxStore};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::publisher::{Delivery, EventPublisher};

/// Relay tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Most events fetched per pass.
    pub batch_size: usize,

    /// Pause between passes.
    pub poll_interval: Duration,

    /// Events that failed this many times are no longer fetched.
    pub max_attempts: i32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_secs(3),
            max_attempts: 5,
        }
    }
}

/// What one pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub fetched: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Held back because an earlier event of the same order failed in this pass.
    pub skipped: usize,
    pub unrecognized: usize,
}

enum Outcome {
    Delivered,
    Failed,
    Unrecognized,
}

/// Delivers unprocessed outbox events in creation order.
///
/// Within one order, events go out strictly in sequence: once an event fails,
/// the order's later events wait for the next pass.
pub struct OutboxRelay<S, P> {
    store: Arc<S>,
    publisher: P,
    config: RelayConfig,
}

impl<S, P> OutboxRelay<S, P>
where
    S: OutboxStore,
    P: EventPublisher,
{
    pub fn new(store: Arc<S>, publisher: P, config: RelayConfig) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    pub fn config(&self) -> RelayConfig {
        self.config
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Runs a single pass over the current backlog.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<RelayReport> {
        let started = Instant::now();
        let events = self
            .store
            .fetch_unprocessed(self.config.batch_size, self.config.max_attempts)
            .await?;

        let mut report = RelayReport {
            fetched: events.len(),
            ..RelayReport::default()
        };
        if events.is_empty() {
            return Ok(report);
        }

        let mut blocked: HashSet<String> = HashSet::new();
        for row in events {
            if blocked.contains(&row.aggregate_id) {
                debug!(event_id = row.id, "Held back behind a failed event");
                report.skipped += 1;
                continue;
            }

            match self.relay(&row).await? {
                Outcome::Delivered => report.delivered += 1,
                Outcome::Failed => {
                    report.failed += 1;
                    blocked.insert(row.aggregate_id);
                }
                Outcome::Unrecognized => {
                    report.unrecognized += 1;
                    blocked.insert(row.aggregate_id);
                }
            }
        }

        metrics::histogram!("outbox_relay_batch_seconds")
            .record(started.elapsed().as_secs_f64());
        info!(
            fetched = report.fetched,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "Outbox pass complete"
        );
        Ok(report)
    }

    async fn relay(&self, row: &OutboxEvent) -> Result<Outcome> {
        let event = match OrderEvent::decode(&row.event_type, &row.payload) {
            Ok(Some(event)) => event,
            Ok(None) => {
                warn!(
                    event_id = row.id,
                    event_type = %row.event_type,
                    "Unrecognized outbox event type"
                );
                metrics::counter!("outbox_events_unrecognized_total").increment(1);
                let reason = format!("unrecognized event type: {}", row.event_type);
                self.store.mark_failed(row.id, &reason).await?;
                return Ok(Outcome::Unrecognized);
            }
            Err(e) => {
                warn!(event_id = row.id, error = %e, "Outbox payload does not decode");
                metrics::counter!("outbox_events_failed_total").increment(1);
                let reason = format!("undecodable payload: {e}");
                self.store.mark_failed(row.id, &reason).await?;
                return Ok(Outcome::Failed);
            }
        };

        let delivery = Delivery {
            event_id: row.id,
            aggregate_id: row.aggregate_id.clone(),
            created_at: row.created_at,
            event,
        };

        match self.publisher.publish(&delivery).await {
            Ok(()) => {
                self.store.mark_processed(row.id).await?;
                metrics::counter!(
                    "outbox_events_delivered_total",
                    "event_type" => delivery.event_type()
                )
                .increment(1);
                Ok(Outcome::Delivered)
            }
            Err(e) => {
                warn!(
                    event_id = row.id,
                    attempt = row.retry_count + 1,
                    error = %e,
                    "Outbox delivery failed"
                );
                metrics::counter!("outbox_events_failed_total").increment(1);
                self.store.mark_failed(row.id, &e.to_string()).await?;
                Ok(Outcome::Failed)
            }
        }
    }

    /// Runs passes on a fixed delay until `shutdown` turns true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch_size = self.config.batch_size,
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "Outbox relay started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.run_once().await {
                error!(error = %e, "Outbox pass failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Outbox relay stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::InMemoryPublisher;
    use common::MemberId;
    use domain::Order;
    use store::{InMemoryShopStore, NewOutboxEvent, StoreError, UnitOfWork, atomically};

    async fn placed_order(store: &InMemoryShopStore) -> Order {
        let mut order = Order::place(MemberId::new(), None);
        atomically(store, |uow: &mut UnitOfWork| {
            uow.save_order(&mut order);
            uow.record(&OrderEvent::created(&order))?;
            Ok::<_, StoreError>(())
        })
        .await
        .unwrap();
        order
    }

    fn relay(
        store: &Arc<InMemoryShopStore>,
        publisher: &InMemoryPublisher,
    ) -> OutboxRelay<InMemoryShopStore, InMemoryPublisher> {
        OutboxRelay::new(store.clone(), publisher.clone(), RelayConfig::default())
    }

    #[tokio::test]
    async fn empty_outbox_is_a_no_op() {
        let store = Arc::new(InMemoryShopStore::new());
        let publisher = InMemoryPublisher::new();

        let report = relay(&store, &publisher).run_once().await.unwrap();
        assert_eq!(report, RelayReport::default());
        assert!(publisher.delivered().is_empty());
    }

    #[tokio::test]
    async fn delivery_marks_processed() {
        let store = Arc::new(InMemoryShopStore::new());
        let publisher = InMemoryPublisher::new();
        let order = placed_order(&store).await;

        let report = relay(&store, &publisher).run_once().await.unwrap();
        assert_eq!(report.delivered, 1);

        let delivered = publisher.delivered();
        assert_eq!(delivered[0].aggregate_id, order.id().to_string());
        assert_eq!(delivered[0].event_type(), "OrderCreated");
        assert!(store.outbox_events().await[0].is_processed());
    }

    #[tokio::test]
    async fn unknown_type_ages_out() {
        let store = Arc::new(InMemoryShopStore::new());
        let publisher = InMemoryPublisher::new();
        atomically(store.as_ref(), |uow: &mut UnitOfWork| {
            uow.append_raw(NewOutboxEvent {
                aggregate_type: "Order".into(),
                aggregate_id: "legacy".into(),
                event_type: "OrderShippedV0".into(),
                payload: serde_json::json!({}),
            });
            Ok::<_, StoreError>(())
        })
        .await
        .unwrap();

        let config = RelayConfig {
            max_attempts: 2,
            ..RelayConfig::default()
        };
        let relay = OutboxRelay::new(store.clone(), publisher.clone(), config);

        assert_eq!(relay.run_once().await.unwrap().unrecognized, 1);
        assert_eq!(relay.run_once().await.unwrap().unrecognized, 1);
        assert_eq!(relay.run_once().await.unwrap().fetched, 0);

        let row = &store.outbox_events().await[0];
        assert!(!row.is_processed());
        assert_eq!(row.retry_count, 2);
        assert_eq!(
            row.last_error.as_deref(),
            Some("unrecognized event type: OrderShippedV0")
        );
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let store = Arc::new(InMemoryShopStore::new());
        let publisher = InMemoryPublisher::new();
        placed_order(&store).await;

        let relay = Arc::new(OutboxRelay::new(
            store.clone(),
            publisher.clone(),
            RelayConfig {
                poll_interval: Duration::from_millis(10),
                ..RelayConfig::default()
            },
        ));
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn({
            let relay = relay.clone();
            async move { relay.run(rx).await }
        });

        while publisher.delivered().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
