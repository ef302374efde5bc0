//! Order domain events.
//!
//! Events are written to the outbox as an `(event_type, payload)` pair where the
//! payload is the JSON form of the variant's data struct.

use chrono::{DateTime, Utc};
use common::{MemberId, OrderId};
use serde::{Deserialize, Serialize};

use super::{Order, OrderItem, OrderStatus};
use crate::money::Money;

/// Aggregate type recorded on every order outbox row.
pub const AGGREGATE_TYPE: &str = "Order";

/// Payment method recorded on card payments.
pub const PAYMENT_METHOD_CARD: &str = "CARD";

/// Events emitted by order state changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was placed.
    OrderCreated(OrderCreatedData),

    /// Payment was captured.
    PaymentCompleted(PaymentCompletedData),

    /// Order was cancelled.
    OrderCancelled(OrderCancelledData),
}

/// Data for OrderCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order_id: OrderId,
    pub member_id: MemberId,
    pub order_number: String,
    pub total_amount: Money,
    pub discount_amount: Money,
    pub payment_amount: Money,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

/// Data for PaymentCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCompletedData {
    pub order_id: OrderId,
    pub order_number: String,
    pub member_id: MemberId,
    pub payment_amount: Money,
    pub payment_method: String,

    /// Gateway transaction reference.
    pub transaction_id: String,

    /// Receipt reference, `receipt-{transaction_id}`.
    pub receipt_url: String,
    pub paid_at: DateTime<Utc>,
}

/// Data for OrderCancelled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub order_id: OrderId,
    pub order_number: String,
    pub member_id: MemberId,

    /// Reason for cancellation.
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

impl OrderEvent {
    /// Builds an OrderCreated event from the freshly placed order.
    pub fn created(order: &Order) -> Self {
        OrderEvent::OrderCreated(OrderCreatedData {
            order_id: order.id(),
            member_id: order.member_id(),
            order_number: order.order_number().to_string(),
            total_amount: order.total_amount(),
            discount_amount: order.discount_amount(),
            payment_amount: order.payment_amount(),
            status: order.status(),
            items: order.items().to_vec(),
            created_at: order.created_at(),
        })
    }

    /// Builds a PaymentCompleted event for a paid order.
    pub fn payment_completed(
        order: &Order,
        payment_method: impl Into<String>,
        transaction_id: impl Into<String>,
    ) -> Self {
        let transaction_id = transaction_id.into();
        OrderEvent::PaymentCompleted(PaymentCompletedData {
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            member_id: order.member_id(),
            payment_amount: order.payment_amount(),
            payment_method: payment_method.into(),
            receipt_url: format!("receipt-{transaction_id}"),
            transaction_id,
            paid_at: Utc::now(),
        })
    }

    /// Builds an OrderCancelled event.
    pub fn cancelled(order: &Order, reason: impl Into<String>) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            member_id: order.member_id(),
            reason: reason.into(),
            cancelled_at: Utc::now(),
        })
    }

    /// Returns the event type name stored on the outbox row.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::PaymentCompleted(_) => "PaymentCompleted",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
        }
    }

    /// Returns the id of the order the event belongs to.
    pub fn aggregate_id(&self) -> OrderId {
        match self {
            OrderEvent::OrderCreated(data) => data.order_id,
            OrderEvent::PaymentCompleted(data) => data.order_id,
            OrderEvent::OrderCancelled(data) => data.order_id,
        }
    }

    /// Serializes the variant's data as the outbox payload.
    pub fn payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            OrderEvent::OrderCreated(data) => serde_json::to_value(data),
            OrderEvent::PaymentCompleted(data) => serde_json::to_value(data),
            OrderEvent::OrderCancelled(data) => serde_json::to_value(data),
        }
    }

    /// Rebuilds an event from an outbox row.
    ///
    /// Returns `Ok(None)` when `event_type` names no known event, and an error
    /// when the type is known but the payload does not match it.
    pub fn decode(
        event_type: &str,
        payload: &serde_json::Value,
    ) -> serde_json::Result<Option<Self>> {
        let event = match event_type {
            "OrderCreated" => OrderEvent::OrderCreated(serde_json::from_value(payload.clone())?),
            "PaymentCompleted" => {
                OrderEvent::PaymentCompleted(serde_json::from_value(payload.clone())?)
            }
            "OrderCancelled" => {
                OrderEvent::OrderCancelled(serde_json::from_value(payload.clone())?)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::IdempotencyKey;

    fn order() -> Order {
        Order::place(MemberId::new(), IdempotencyKey::parse(Some("k")))
    }

    #[test]
    fn test_event_type() {
        let order = order();
        assert_eq!(OrderEvent::created(&order).event_type(), "OrderCreated");
        assert_eq!(
            OrderEvent::payment_completed(&order, PAYMENT_METHOD_CARD, "TXN-1").event_type(),
            "PaymentCompleted"
        );
        assert_eq!(
            OrderEvent::cancelled(&order, "changed mind").event_type(),
            "OrderCancelled"
        );
    }

    #[test]
    fn created_event_snapshots_order() {
        let order = order();
        let OrderEvent::OrderCreated(data) = OrderEvent::created(&order) else {
            panic!("expected OrderCreated");
        };
        assert_eq!(data.order_id, order.id());
        assert_eq!(data.member_id, order.member_id());
        assert_eq!(data.order_number, order.order_number().as_str());
        assert_eq!(data.status, OrderStatus::Pending);
        assert!(data.items.is_empty());
    }

    #[test]
    fn payment_completed_carries_receipt() {
        let order = order();
        let event = OrderEvent::payment_completed(&order, PAYMENT_METHOD_CARD, "TXN-42");
        assert_eq!(event.aggregate_id(), order.id());

        let OrderEvent::PaymentCompleted(data) = event else {
            panic!("expected PaymentCompleted");
        };
        assert_eq!(data.payment_method, "CARD");
        assert_eq!(data.transaction_id, "TXN-42");
        assert_eq!(data.receipt_url, "receipt-TXN-42");
    }

    #[test]
    fn payload_decodes_back_to_event() {
        let order = order();
        let event = OrderEvent::cancelled(&order, "out of budget");
        let payload = event.payload().unwrap();

        // The payload is the bare data object, not the tagged enum.
        assert_eq!(payload["reason"], "out of budget");
        assert!(payload.get("type").is_none());

        let decoded = OrderEvent::decode(event.event_type(), &payload).unwrap();
        assert_eq!(decoded, Some(event));
    }

    #[test]
    fn unknown_event_type_decodes_to_none() {
        let decoded = OrderEvent::decode("OrderRefunded", &serde_json::json!({})).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let result = OrderEvent::decode("OrderCancelled", &serde_json::json!({"reason": 1}));
        assert!(result.is_err());
    }
}
