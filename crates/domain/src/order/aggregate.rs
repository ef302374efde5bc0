//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{MemberId, OrderId};
use serde::{Deserialize, Serialize};

use super::{IdempotencyKey, OrderError, OrderItem, OrderNumber, OrderStatus};
use crate::money::Money;

/// Order aggregate root.
///
/// Holds the line items and amounts of an order and guards its status
/// transitions. Persistence is handled elsewhere; this type only enforces
/// which changes are legal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_number: OrderNumber,
    member_id: MemberId,
    items: Vec<OrderItem>,
    total_amount: Money,
    discount_amount: Money,
    payment_amount: Money,
    status: OrderStatus,
    idempotency_key: Option<IdempotencyKey>,

    /// Persisted revision, used for optimistic concurrency.
    #[serde(default)]
    version: i64,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// Query methods
impl Order {
    /// Returns the order ID.
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Returns the business-facing order number.
    pub fn order_number(&self) -> &OrderNumber {
        &self.order_number
    }

    /// Returns the owning member.
    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    /// Returns the line items in insertion order.
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Returns the sum of all item subtotals.
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    /// Returns the applied discount.
    pub fn discount_amount(&self) -> Money {
        self.discount_amount
    }

    /// Returns the amount to charge (`total - discount`).
    pub fn payment_amount(&self) -> Money {
        self.payment_amount
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns the idempotency key bound to this order, if any.
    pub fn idempotency_key(&self) -> Option<&IdempotencyKey> {
        self.idempotency_key.as_ref()
    }

    /// Returns the persisted revision (0 for an order never stored).
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

// Command methods
impl Order {
    /// Opens a new pending order with no items and zero amounts.
    pub fn place(member_id: MemberId, idempotency_key: Option<IdempotencyKey>) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            order_number: OrderNumber::generate(),
            member_id,
            items: Vec::new(),
            total_amount: Money::zero(),
            discount_amount: Money::zero(),
            payment_amount: Money::zero(),
            status: OrderStatus::Pending,
            idempotency_key,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the generated order number of an order that was never saved.
    pub fn with_order_number(mut self, order_number: OrderNumber) -> Self {
        self.order_number = order_number;
        self
    }

    /// Appends a line item and recomputes the amounts.
    pub fn add_item(&mut self, item: OrderItem) -> Result<(), OrderError> {
        self.ensure(self.status.can_modify_items(), "add item")?;

        if item.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                quantity: item.quantity,
            });
        }

        item.unit_price
            .checked_multiply(item.quantity)
            .and_then(|subtotal| self.total_amount.checked_add(subtotal))
            .ok_or(OrderError::AmountOverflow)?;

        self.items.push(item);
        self.recalculate();
        Ok(())
    }

    /// Sets the discount and recomputes the amounts.
    ///
    /// The discount is clamped to the current total, so the payment amount never
    /// goes negative. Returns the discount actually applied.
    pub fn apply_discount(&mut self, discount: Money) -> Result<Money, OrderError> {
        self.ensure(self.status.can_modify_items(), "apply discount")?;

        let effective = discount.clamp(Money::zero(), self.total_amount);
        self.discount_amount = effective;
        self.recalculate();
        Ok(effective)
    }

    /// Marks the order paid, binding `idempotency_key` if the order has none yet.
    pub fn mark_paid(&mut self, idempotency_key: Option<IdempotencyKey>) -> Result<(), OrderError> {
        self.ensure(self.status.can_pay(), "pay")?;

        if self.idempotency_key.is_none() {
            self.idempotency_key = idempotency_key;
        }
        self.transition(OrderStatus::Paid);
        Ok(())
    }

    /// Marks a paid order as shipped.
    pub fn ship(&mut self) -> Result<(), OrderError> {
        self.ensure(self.status.can_ship(), "ship")?;
        self.transition(OrderStatus::Shipped);
        Ok(())
    }

    /// Marks a shipped order as delivered.
    pub fn deliver(&mut self) -> Result<(), OrderError> {
        self.ensure(self.status.can_deliver(), "deliver")?;
        self.transition(OrderStatus::Delivered);
        Ok(())
    }

    /// Cancels a pending or paid order.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        self.ensure(self.status.can_cancel(), "cancel")?;
        self.transition(OrderStatus::Cancelled);
        Ok(())
    }

    /// Advances the persisted revision.
    ///
    /// Called by the persistence layer when it stages a write of this order.
    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    fn ensure(&self, allowed: bool, action: &'static str) -> Result<(), OrderError> {
        if allowed {
            Ok(())
        } else {
            Err(OrderError::InvalidStatus {
                current: self.status,
                action,
            })
        }
    }

    fn transition(&mut self, next: OrderStatus) {
        self.status = next;
        self.updated_at = Utc::now();
    }

    fn recalculate(&mut self) {
        self.total_amount = self.items.iter().map(|item| item.subtotal).sum();
        self.payment_amount = self.total_amount - self.discount_amount;
        self.updated_at = Utc::now();
    }
}
