//! Staged writes committed as one atomic step.

use domain::{Order, OrderEvent};

use crate::outbox::NewOutboxEvent;
use crate::store::Transactional;
use crate::{Result, StoreError};

/// An order write together with the version it was loaded at.
#[derive(Debug, Clone)]
pub struct StagedOrder {
    /// Version the stored row must still have; 0 means the order is new.
    pub expected_version: i64,
    pub order: Order,
}

/// A batch of order and outbox writes.
///
/// Nothing reaches the store until the batch is handed to
/// [`Transactional::commit`], which applies all of it or none of it.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    orders: Vec<StagedOrder>,
    outbox: Vec<NewOutboxEvent>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a write of `order` and advances its version.
    pub fn save_order(&mut self, order: &mut Order) {
        let expected_version = order.version();
        order.bump_version();
        self.orders.push(StagedOrder {
            expected_version,
            order: order.clone(),
        });
    }

    /// Stages the outbox row for `event`.
    pub fn record(&mut self, event: &OrderEvent) -> Result<()> {
        self.outbox.push(NewOutboxEvent::from_event(event)?);
        Ok(())
    }

    /// Stages an already encoded outbox row.
    pub fn append_raw(&mut self, event: NewOutboxEvent) {
        self.outbox.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty() && self.outbox.is_empty()
    }

    pub fn orders(&self) -> &[StagedOrder] {
        &self.orders
    }

    pub fn outbox_events(&self) -> &[NewOutboxEvent] {
        &self.outbox
    }

    pub fn into_parts(self) -> (Vec<StagedOrder>, Vec<NewOutboxEvent>) {
        (self.orders, self.outbox)
    }
}

/// Runs `work` against a fresh unit of work and commits it.
///
/// If `work` returns an error the staged writes are dropped and nothing is
/// committed.
///
/// ```ignore
/// let order = atomically(&store, |uow| {
///     uow.save_order(&mut order);
///     uow.record(&OrderEvent::created(&order))?;
///     Ok::<_, StoreError>(order)
/// })
/// .await?;
/// ```
pub async fn atomically<S, T, E, F>(store: &S, work: F) -> std::result::Result<T, E>
where
    S: Transactional + ?Sized,
    F: FnOnce(&mut UnitOfWork) -> std::result::Result<T, E>,
    E: From<StoreError>,
{
    let mut uow = UnitOfWork::new();
    let value = work(&mut uow)?;
    store.commit(uow).await?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::MemberId;

    #[test]
    fn save_order_records_expected_version() {
        let mut order = Order::place(MemberId::new(), None);
        let mut uow = UnitOfWork::new();

        uow.save_order(&mut order);
        assert_eq!(order.version(), 1);
        assert_eq!(uow.orders()[0].expected_version, 0);
        assert_eq!(uow.orders()[0].order.version(), 1);

        uow.save_order(&mut order);
        assert_eq!(uow.orders()[1].expected_version, 1);
    }

    #[test]
    fn record_encodes_event() {
        let order = Order::place(MemberId::new(), None);
        let mut uow = UnitOfWork::new();
        uow.record(&OrderEvent::created(&order)).unwrap();

        let staged = &uow.outbox_events()[0];
        assert_eq!(staged.aggregate_type, "Order");
        assert_eq!(staged.aggregate_id, order.id().to_string());
        assert_eq!(staged.event_type, "OrderCreated");
        assert!(!uow.is_empty());
    }
}
