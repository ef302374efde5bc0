//! Discount coupons.

use chrono::{DateTime, Utc};
use common::CouponId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    /// Flat amount off.
    Fixed,
    /// Whole-number percentage of the order amount.
    Percentage,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Fixed => "FIXED",
            DiscountType::Percentage => "PERCENTAGE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FIXED" => Some(DiscountType::Fixed),
            "PERCENTAGE" => Some(DiscountType::Percentage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponStatus {
    #[default]
    Active,
    Expired,
    Depleted,
}

impl CouponStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponStatus::Active => "ACTIVE",
            CouponStatus::Expired => "EXPIRED",
            CouponStatus::Depleted => "DEPLETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(CouponStatus::Active),
            "EXPIRED" => Some(CouponStatus::Expired),
            "DEPLETED" => Some(CouponStatus::Depleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("coupon is not available")]
    NotAvailable,

    #[error("coupon quota exceeded")]
    QuotaExceeded,
}

/// A discount coupon.
///
/// `remaining_quantity` of `None` means the coupon is not quantity limited for
/// validity purposes, but it also cannot be consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub code: String,
    pub name: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub min_purchase_amount: Money,
    pub max_discount_amount: Option<Money>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub total_quantity: Option<u32>,
    pub remaining_quantity: Option<u32>,
    pub status: CouponStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    /// Creates an active coupon with no quantity limit and no discount cap.
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        discount_type: DiscountType,
        discount_value: i64,
        min_purchase_amount: Money,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CouponId::new(),
            code: code.into(),
            name: name.into(),
            discount_type,
            discount_value,
            min_purchase_amount,
            max_discount_amount: None,
            valid_from,
            valid_until,
            total_quantity: None,
            remaining_quantity: None,
            status: CouponStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Caps the discount at `max`.
    pub fn with_max_discount(mut self, max: Money) -> Self {
        self.max_discount_amount = Some(max);
        self
    }

    /// Limits the coupon to `quantity` uses.
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.total_quantity = Some(quantity);
        self.remaining_quantity = Some(quantity);
        self
    }

    /// Computes the discount for an order of `order_amount`.
    pub fn calculate_discount(&self, order_amount: Money) -> Money {
        if order_amount < self.min_purchase_amount {
            return Money::zero();
        }

        let discount = match self.discount_type {
            DiscountType::Fixed => Money::new(self.discount_value),
            DiscountType::Percentage => order_amount.percent(self.discount_value),
        };

        match self.max_discount_amount {
            Some(max) if discount > max => max,
            _ => discount,
        }
    }

    /// Returns true if the coupon can be applied at `now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        let within_period = self.valid_from <= now && now <= self.valid_until;
        let has_remaining = self.remaining_quantity.is_none_or(|left| left > 0);
        within_period && has_remaining && self.status == CouponStatus::Active
    }

    pub fn ensure_valid(&self, now: DateTime<Utc>) -> Result<(), CouponError> {
        if self.is_valid(now) {
            Ok(())
        } else {
            Err(CouponError::NotAvailable)
        }
    }

    /// Uses up one coupon from the remaining quantity.
    pub fn consume(&mut self) -> Result<(), CouponError> {
        match self.remaining_quantity {
            Some(left) if left > 0 => {
                self.remaining_quantity = Some(left - 1);
                if left == 1 {
                    self.status = CouponStatus::Depleted;
                }
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(CouponError::QuotaExceeded),
        }
    }
}
