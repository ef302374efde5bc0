//! Order use cases.
//!
//! Each operation loads the order, applies one change through the aggregate and
//! commits the new order state together with its outbox row in a single unit
//! of work. Stock and coupon checks are delegated to their services.

use std::sync::Arc;

use common::{CouponId, MemberId, OrderId, ProductId};
use distributed_lock::{LockManager, LockOptions};
use domain::{
    IdempotencyKey, Order, OrderError, OrderEvent, OrderItem, OrderNumber, OrderStatus,
    PAYMENT_METHOD_CARD,
};
use store::{
    ORDER_IDEMPOTENCY_KEY_CONSTRAINT, ORDER_NUMBER_CONSTRAINT, ShopStore, StoreError, atomically,
};
use tracing::{error, info, warn};

use crate::coupon::CouponService;
use crate::error::{Result, ShopError};
use crate::payment::{PaymentGateway, PaymentRequest, PaymentService};
use crate::product::ProductService;

fn order_error(order_id: OrderId, error: OrderError) -> ShopError {
    match error {
        OrderError::InvalidStatus { current, action } => ShopError::InvalidOrderStatus {
            order_id,
            current,
            action,
        },
        OrderError::InvalidQuantity { quantity } => ShopError::InvalidQuantity { quantity },
        OrderError::AmountOverflow => ShopError::InvalidInput("order amount out of range".into()),
    }
}

fn ensure_status(order: &Order, allowed: bool, action: &'static str) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(ShopError::InvalidOrderStatus {
            order_id: order.id(),
            current: order.status(),
            action,
        })
    }
}

/// A unique violation on the order key means another order took it first.
fn key_conflict(error: StoreError, key: Option<&IdempotencyKey>) -> ShopError {
    match key {
        Some(key) if error.unique_constraint() == Some(ORDER_IDEMPOTENCY_KEY_CONSTRAINT) => {
            ShopError::IdempotencyKeyConflict {
                key: key.to_string(),
            }
        }
        _ => ShopError::from(error),
    }
}

/// Order numbers drawn before giving up on collisions.
const ORDER_NUMBER_ATTEMPTS: u32 = 3;

type OrderNumberSource = Arc<dyn Fn() -> OrderNumber + Send + Sync>;

/// Drives orders through their lifecycle.
pub struct OrderOrchestrator<S, L, G> {
    store: Arc<S>,
    order_numbers: OrderNumberSource,
    products: ProductService<S, L>,
    coupons: CouponService<S, L>,
    payments: PaymentService<G>,
}

impl<S, L, G> OrderOrchestrator<S, L, G>
where
    S: ShopStore,
    L: LockManager,
    G: PaymentGateway,
{
    pub fn new(store: Arc<S>, locks: Arc<L>, gateway: G) -> Self {
        Self {
            products: ProductService::new(store.clone(), locks.clone()),
            coupons: CouponService::new(store.clone(), locks),
            payments: PaymentService::new(gateway),
            order_numbers: Arc::new(OrderNumber::generate),
            store,
        }
    }

    /// Replaces the source of new order numbers.
    pub fn with_order_numbers<F>(mut self, next: F) -> Self
    where
        F: Fn() -> OrderNumber + Send + Sync + 'static,
    {
        self.order_numbers = Arc::new(next);
        self
    }

    /// Sets the wait and lease used for stock and coupon locks.
    pub fn with_lock_options(mut self, options: LockOptions) -> Self {
        self.products = self.products.with_lock_options(options);
        self.coupons = self.coupons.with_lock_options(options);
        self
    }

    pub fn products(&self) -> &ProductService<S, L> {
        &self.products
    }

    pub fn coupons(&self) -> &CouponService<S, L> {
        &self.coupons
    }

    pub fn payments(&self) -> &PaymentService<G> {
        &self.payments
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or(ShopError::OrderNotFound(order_id))
    }

    /// Opens a pending order.
    ///
    /// A non-empty `idempotency_key` already held by any order is rejected,
    /// whatever that order's status. An order number that is already taken
    /// is redrawn a few times before the store error is returned.
    #[tracing::instrument(skip(self))]
    pub async fn create_order(
        &self,
        member_id: MemberId,
        idempotency_key: Option<&str>,
    ) -> Result<Order> {
        let key = IdempotencyKey::parse(idempotency_key);
        if let Some(key) = &key
            && self.store.find_order_by_idempotency_key(key).await?.is_some()
        {
            return Err(ShopError::IdempotencyKeyConflict {
                key: key.to_string(),
            });
        }

        let mut attempt = 1;
        let order = loop {
            let mut order =
                Order::place(member_id, key.clone()).with_order_number((self.order_numbers)());
            let event = OrderEvent::created(&order);
            match self.commit(&mut order, Some(&event)).await {
                Ok(()) => break order,
                Err(e)
                    if e.unique_constraint() == Some(ORDER_NUMBER_CONSTRAINT)
                        && attempt < ORDER_NUMBER_ATTEMPTS =>
                {
                    warn!(order_number = %order.order_number(), attempt, "Order number taken, drawing another");
                    attempt += 1;
                }
                Err(e) => return Err(key_conflict(e, key.as_ref())),
            }
        };

        metrics::counter!("orders_created_total").increment(1);
        info!(order_id = %order.id(), order_number = %order.order_number(), "Order created");
        Ok(order)
    }

    /// Takes `quantity` units of a product out of stock and adds them as a line.
    ///
    /// If the order cannot be saved afterwards the units are put back.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Order> {
        if quantity == 0 {
            return Err(ShopError::InvalidQuantity { quantity });
        }

        let mut order = self.get_order(order_id).await?;
        ensure_status(&order, order.status().can_modify_items(), "add item")?;

        let product = self.products.decrement_stock(product_id, quantity).await?;

        let saved = match order.add_item(OrderItem::snapshot(&product, quantity)) {
            Ok(()) => self.commit(&mut order, None).await.map_err(ShopError::from),
            Err(e) => Err(order_error(order_id, e)),
        };
        if let Err(e) = saved {
            self.restore_stock(product_id, quantity).await;
            return Err(e);
        }

        info!(total = %order.total_amount(), "Item added");
        Ok(order)
    }

    /// Applies a coupon's discount to a pending order.
    ///
    /// The coupon is validated but its quantity is not consumed here.
    #[tracing::instrument(skip(self))]
    pub async fn apply_coupon(&self, order_id: OrderId, coupon_id: CouponId) -> Result<Order> {
        let mut order = self.get_order(order_id).await?;
        ensure_status(&order, order.status().can_modify_items(), "apply coupon")?;

        let discount = self
            .coupons
            .apply_discount(coupon_id, order.total_amount())
            .await?;
        order
            .apply_discount(discount)
            .map_err(|e| order_error(order_id, e))?;
        self.commit(&mut order, None).await?;

        info!(
            discount = %order.discount_amount(),
            payment = %order.payment_amount(),
            "Coupon applied"
        );
        Ok(order)
    }

    /// Charges the order's payment amount and marks it paid.
    ///
    /// Replays are answered from the stored order: a key already bound to this
    /// paid order, or an order that is already paid, returns it unchanged
    /// without calling the gateway. A key bound to a different order is a
    /// conflict.
    #[tracing::instrument(skip(self, payment_token))]
    pub async fn pay_order(
        &self,
        order_id: OrderId,
        payment_token: &str,
        idempotency_key: Option<&str>,
    ) -> Result<Order> {
        let key = IdempotencyKey::parse(idempotency_key);
        if let Some(key) = &key
            && let Some(bound) = self.store.find_order_by_idempotency_key(key).await?
        {
            if bound.id() != order_id {
                return Err(ShopError::IdempotencyKeyConflict {
                    key: key.to_string(),
                });
            }
            if bound.status() == OrderStatus::Paid {
                info!("Payment replayed");
                return Ok(bound);
            }
        }

        let mut order = self.get_order(order_id).await?;
        if order.status() == OrderStatus::Paid {
            info!("Order already paid");
            return Ok(order);
        }
        ensure_status(&order, order.status().can_pay(), "pay")?;

        let transaction_id = self
            .payments
            .process_payment(PaymentRequest {
                order_id,
                amount: order.payment_amount(),
                payment_token: payment_token.to_string(),
            })
            .await?;

        order
            .mark_paid(key.clone())
            .map_err(|e| order_error(order_id, e))?;
        let event = OrderEvent::payment_completed(&order, PAYMENT_METHOD_CARD, &transaction_id);

        if let Err(e) = self.commit(&mut order, Some(&event)).await {
            let error = key_conflict(e, key.as_ref());
            warn!(%transaction_id, error = %error, "Order not saved after payment, cancelling charge");
            if let Err(cancel_error) = self.payments.cancel_payment(&transaction_id).await {
                error!(%transaction_id, error = %cancel_error, "Charge left uncancelled");
            }
            return Err(error);
        }

        metrics::counter!("orders_paid_total").increment(1);
        info!(%transaction_id, amount = %order.payment_amount(), "Order paid");
        Ok(order)
    }

    /// Cancels a pending or paid order.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId, reason: &str) -> Result<Order> {
        let mut order = self.get_order(order_id).await?;
        order.cancel().map_err(|e| order_error(order_id, e))?;

        let event = OrderEvent::cancelled(&order, reason);
        self.commit(&mut order, Some(&event)).await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        info!("Order cancelled");
        Ok(order)
    }

    async fn commit(
        &self,
        order: &mut Order,
        event: Option<&OrderEvent>,
    ) -> std::result::Result<(), StoreError> {
        atomically(self.store.as_ref(), |uow| {
            uow.save_order(order);
            if let Some(event) = event {
                uow.record(event)?;
            }
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn restore_stock(&self, product_id: ProductId, quantity: u32) {
        match self.products.restock(product_id, quantity).await {
            Ok(_) => warn!(%product_id, quantity, "Stock restored after failed order write"),
            Err(e) => error!(%product_id, quantity, error = %e, "Stock not restored"),
        }
    }
}
