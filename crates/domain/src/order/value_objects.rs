//! Value objects for the order domain.

use common::ProductId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;
use crate::product::Product;

/// Business-facing order number, e.g. `ORD-1A2B3C4D`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generates a fresh order number.
    pub fn generate() -> Self {
        let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
        Self(format!("ORD-{suffix}"))
    }

    /// Wraps an order number issued elsewhere.
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Returns the order number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-supplied token identifying a retried request.
///
/// Empty strings are not keys; [`IdempotencyKey::parse`] maps them to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Parses an optional raw key, treating empty input as absent.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.filter(|key| !key.is_empty())
            .map(|key| Self(key.to_string()))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A line item of an order.
///
/// Name and price are copied from the product when the item is added, so later
/// catalog changes never rewrite historical orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The product identifier.
    pub product_id: ProductId,

    /// Product name at the time of purchase.
    pub product_name: String,

    /// Unit price at the time of purchase.
    pub unit_price: Money,

    /// Quantity ordered.
    pub quantity: u32,

    /// `unit_price * quantity`.
    pub subtotal: Money,
}

impl OrderItem {
    /// Creates a new order item, computing the subtotal.
    ///
    /// A subtotal too large to represent is clamped; [`Order::add_item`]
    /// rejects such items.
    ///
    /// [`Order::add_item`]: crate::Order::add_item
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            unit_price,
            quantity,
            subtotal: unit_price.saturating_multiply(quantity),
        }
    }

    /// Captures the current name and price of `product`.
    pub fn snapshot(product: &Product, quantity: u32) -> Self {
        Self::new(product.id, product.name.clone(), product.price, quantity)
    }
}
