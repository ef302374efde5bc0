//! Catalog products and their stock counter.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

/// Sales status of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
    /// Set automatically when stock reaches zero.
    OutOfStock,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "ACTIVE",
            ProductStatus::Inactive => "INACTIVE",
            ProductStatus::OutOfStock => "OUT_OF_STOCK",
        }
    }

    /// Parses a stored status name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(ProductStatus::Active),
            "INACTIVE" => Some(ProductStatus::Inactive),
            "OUT_OF_STOCK" => Some(ProductStatus::OutOfStock),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stock counter violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    #[error("product is not on sale")]
    NotActive,

    #[error("insufficient stock: requested {requested}, available {available}")]
    Insufficient { requested: u32, available: u32 },

    #[error("invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub stock_quantity: u32,
    pub category: String,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates an active product.
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        price: Money,
        stock_quantity: u32,
        category: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ProductId::new(),
            name: name.into(),
            description,
            price,
            stock_quantity,
            category: category.into(),
            status: ProductStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Removes `quantity` units from stock.
    ///
    /// An inactive product cannot be sold. A product that ran out of stock
    /// reports the shortage as [`StockError::Insufficient`].
    pub fn decrement_stock(&mut self, quantity: u32) -> Result<(), StockError> {
        if quantity == 0 {
            return Err(StockError::InvalidQuantity { quantity });
        }
        if self.status == ProductStatus::Inactive {
            return Err(StockError::NotActive);
        }
        if quantity > self.stock_quantity {
            return Err(StockError::Insufficient {
                requested: quantity,
                available: self.stock_quantity,
            });
        }

        self.stock_quantity -= quantity;
        if self.stock_quantity == 0 {
            self.status = ProductStatus::OutOfStock;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Adds `quantity` units to stock, putting a sold-out product back on sale.
    pub fn add_stock(&mut self, quantity: u32) -> Result<(), StockError> {
        if quantity == 0 {
            return Err(StockError::InvalidQuantity { quantity });
        }

        self.stock_quantity = self.stock_quantity.saturating_add(quantity);
        if self.status == ProductStatus::OutOfStock && self.stock_quantity > 0 {
            self.status = ProductStatus::Active;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}
