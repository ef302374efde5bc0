use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CouponId, MemberId, OrderId, ProductId};
use domain::{Coupon, CouponStatus, IdempotencyKey, Member, Order, OrderNumber, Product};
use tokio::sync::RwLock;

use crate::outbox::OutboxEvent;
use crate::store::{
    COUPON_CODE_CONSTRAINT, CouponRepository, MEMBER_EMAIL_CONSTRAINT, MemberRepository,
    ORDER_IDEMPOTENCY_KEY_CONSTRAINT, ORDER_NUMBER_CONSTRAINT, OrderRepository, OutboxStore,
    ProductRepository, Transactional,
};
use crate::unit_of_work::UnitOfWork;
use crate::{Result, StoreError};

#[derive(Debug, Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    products: HashMap<ProductId, Product>,
    coupons: HashMap<CouponId, Coupon>,
    members: HashMap<MemberId, Member>,
    outbox: Vec<OutboxEvent>,
    last_outbox_id: i64,
}

impl State {
    fn key_holder(&self, key: &IdempotencyKey) -> Option<OrderId> {
        self.orders
            .values()
            .find(|order| order.idempotency_key() == Some(key))
            .map(Order::id)
    }

    fn number_holder(&self, number: &OrderNumber) -> Option<OrderId> {
        self.orders
            .values()
            .find(|order| order.order_number() == number)
            .map(Order::id)
    }

    fn outbox_event_mut(&mut self, id: i64) -> Result<&mut OutboxEvent> {
        self.outbox
            .iter_mut()
            .find(|event| event.id == id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "outbox event",
                id: id.to_string(),
            })
    }
}

/// In-memory shop store for tests and database-less runs.
///
/// Commits take one write lock and validate the whole unit of work before
/// applying any of it, so a rejected commit leaves no partial state.
#[derive(Clone, Default)]
pub struct InMemoryShopStore {
    state: Arc<RwLock<State>>,
    fail_on_commit: Arc<AtomicBool>,
}

impl InMemoryShopStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following commit fail with [`StoreError::Unavailable`].
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns every outbox row in id order.
    pub async fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.state.read().await.outbox.clone()
    }

    /// Clears all data.
    pub async fn clear(&self) {
        *self.state.write().await = State::default();
    }
}

#[async_trait]
impl Transactional for InMemoryShopStore {
    async fn commit(&self, uow: UnitOfWork) -> Result<()> {
        if self.fail_on_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit rejected".to_string()));
        }

        let (orders, outbox) = uow.into_parts();
        let mut state = self.state.write().await;

        // Validate against stored versions, chaining writes to the same order.
        let mut versions: HashMap<OrderId, i64> = HashMap::new();
        let mut keys: HashMap<IdempotencyKey, OrderId> = HashMap::new();
        let mut numbers: HashMap<OrderNumber, OrderId> = HashMap::new();
        for staged in &orders {
            let id = staged.order.id();
            let current = match versions.get(&id) {
                Some(version) => Some(*version),
                None => state.orders.get(&id).map(Order::version),
            };

            let matches = match current {
                Some(version) => version == staged.expected_version,
                None => staged.expected_version == 0,
            };
            if !matches {
                return Err(StoreError::ConcurrencyConflict {
                    entity: "order",
                    id: id.to_string(),
                    expected: staged.expected_version,
                });
            }
            versions.insert(id, staged.order.version());

            let number = staged.order.order_number();
            let holder = numbers
                .get(number)
                .copied()
                .or_else(|| state.number_holder(number));
            if holder.is_some_and(|holder| holder != id) {
                return Err(StoreError::UniqueViolation {
                    constraint: ORDER_NUMBER_CONSTRAINT.to_string(),
                });
            }
            numbers.insert(number.clone(), id);

            if let Some(key) = staged.order.idempotency_key() {
                let holder = keys
                    .get(key)
                    .copied()
                    .or_else(|| state.key_holder(key));
                if holder.is_some_and(|holder| holder != id) {
                    return Err(StoreError::UniqueViolation {
                        constraint: ORDER_IDEMPOTENCY_KEY_CONSTRAINT.to_string(),
                    });
                }
                keys.insert(key.clone(), id);
            }
        }

        for staged in orders {
            state.orders.insert(staged.order.id(), staged.order);
        }

        let now = Utc::now();
        for event in outbox {
            state.last_outbox_id += 1;
            let id = state.last_outbox_id;
            state.outbox.push(OutboxEvent {
                id,
                aggregate_type: event.aggregate_type,
                aggregate_id: event.aggregate_id,
                event_type: event.event_type,
                payload: event.payload,
                created_at: now,
                processed_at: None,
                retry_count: 0,
                last_error: None,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryShopStore {
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|order| order.idempotency_key() == Some(key))
            .cloned())
    }
}

#[async_trait]
impl ProductRepository for InMemoryShopStore {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn find_products_by_category(&self, category: &str) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<_> = state
            .products
            .values()
            .filter(|p| p.category == category)
            .cloned()
            .collect();
        products.sort_by_key(|p| p.created_at);
        Ok(products)
    }

    async fn all_products(&self) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<_> = state.products.values().cloned().collect();
        products.sort_by_key(|p| p.created_at);
        Ok(products)
    }

    async fn save_product(&self, product: &Product) -> Result<()> {
        let mut state = self.state.write().await;
        state.products.insert(product.id, product.clone());
        Ok(())
    }
}

#[async_trait]
impl CouponRepository for InMemoryShopStore {
    async fn find_coupon(&self, id: CouponId) -> Result<Option<Coupon>> {
        Ok(self.state.read().await.coupons.get(&id).cloned())
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let state = self.state.read().await;
        Ok(state.coupons.values().find(|c| c.code == code).cloned())
    }

    async fn active_coupons(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>> {
        let state = self.state.read().await;
        let mut coupons: Vec<_> = state
            .coupons
            .values()
            .filter(|c| {
                c.status == CouponStatus::Active && c.valid_from <= now && now <= c.valid_until
            })
            .cloned()
            .collect();
        coupons.sort_by_key(|c| c.valid_until);
        Ok(coupons)
    }

    async fn save_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .coupons
            .values()
            .any(|c| c.code == coupon.code && c.id != coupon.id)
        {
            return Err(StoreError::UniqueViolation {
                constraint: COUPON_CODE_CONSTRAINT.to_string(),
            });
        }
        state.coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }
}

#[async_trait]
impl MemberRepository for InMemoryShopStore {
    async fn find_member(&self, id: MemberId) -> Result<Option<Member>> {
        Ok(self.state.read().await.members.get(&id).cloned())
    }

    async fn find_member_by_email(&self, email: &str) -> Result<Option<Member>> {
        let state = self.state.read().await;
        Ok(state.members.values().find(|m| m.email == email).cloned())
    }

    async fn save_member(&self, member: &Member) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .members
            .values()
            .any(|m| m.email == member.email && m.id != member.id)
        {
            return Err(StoreError::UniqueViolation {
                constraint: MEMBER_EMAIL_CONSTRAINT.to_string(),
            });
        }
        state.members.insert(member.id, member.clone());
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryShopStore {
    async fn fetch_unprocessed(
        &self,
        limit: usize,
        max_attempts: i32,
    ) -> Result<Vec<OutboxEvent>> {
        let state = self.state.read().await;
        let mut events: Vec<_> = state
            .outbox
            .iter()
            .filter(|e| e.processed_at.is_none() && e.retry_count < max_attempts)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        events.truncate(limit);
        Ok(events)
    }

    async fn mark_processed(&self, id: i64) -> Result<()> {
        let mut state = self.state.write().await;
        let event = state.outbox_event_mut(id)?;
        if event.processed_at.is_none() {
            event.processed_at = Some(Utc::now());
        }
        event.retry_count = 0;
        event.last_error = None;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let event = state.outbox_event_mut(id)?;
        event.retry_count += 1;
        event.last_error = Some(error.to_string());
        Ok(())
    }

    async fn events_for_aggregate(&self, aggregate_id: &str) -> Result<Vec<OutboxEvent>> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }
}
