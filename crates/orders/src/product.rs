//! Catalog and stock ledger.

use std::sync::Arc;

use common::ProductId;
use distributed_lock::{LockManager, LockOptions, with_lock};
use domain::{Money, Product, StockError};
use store::ProductRepository;
use tracing::{debug, info};

use crate::cache::ReadThroughCache;
use crate::error::{Result, ShopError};

/// Lock key guarding the stock counter of one product.
pub fn stock_lock_key(product_id: ProductId) -> String {
    format!("stock:lock:{product_id}")
}

pub(crate) fn stock_error(product_id: ProductId, error: StockError) -> ShopError {
    match error {
        StockError::NotActive => ShopError::ProductNotActive(product_id),
        StockError::Insufficient {
            requested,
            available,
        } => ShopError::InsufficientStock {
            product_id,
            requested,
            available,
        },
        StockError::InvalidQuantity { quantity } => ShopError::InvalidQuantity { quantity },
    }
}

/// Product catalog with a lock-guarded stock counter.
///
/// Catalog reads go through a cache. Stock changes always reload the product
/// from the store while holding `stock:lock:{id}` and drop the cached entry
/// afterwards.
pub struct ProductService<S, L> {
    store: Arc<S>,
    locks: Arc<L>,
    lock_options: LockOptions,
    cache: ReadThroughCache<ProductId, Product>,
}

impl<S, L> ProductService<S, L>
where
    S: ProductRepository,
    L: LockManager,
{
    pub fn new(store: Arc<S>, locks: Arc<L>) -> Self {
        Self {
            store,
            locks,
            lock_options: LockOptions::default(),
            cache: ReadThroughCache::new("product"),
        }
    }

    pub fn with_lock_options(mut self, options: LockOptions) -> Self {
        self.lock_options = options;
        self
    }

    /// Adds an active product to the catalog.
    #[tracing::instrument(skip(self, description))]
    pub async fn create_product(
        &self,
        name: &str,
        description: Option<String>,
        price: Money,
        stock_quantity: u32,
        category: &str,
    ) -> Result<Product> {
        if name.trim().is_empty() {
            return Err(ShopError::InvalidInput("product name is required".into()));
        }
        if price.is_negative() {
            return Err(ShopError::InvalidInput(format!(
                "product price cannot be negative: {price}"
            )));
        }

        let product = Product::new(name, description, price, stock_quantity, category);
        self.store.save_product(&product).await?;

        info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, product_id: ProductId) -> Result<Product> {
        self.cache
            .get_or_load(&product_id, || self.store.find_product(product_id))
            .await?
            .ok_or(ShopError::ProductNotFound(product_id))
    }

    /// Lists one category, or the whole catalog when `category` is empty.
    #[tracing::instrument(skip(self))]
    pub async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>> {
        let products = match category.map(str::trim) {
            Some(category) if !category.is_empty() => {
                self.store.find_products_by_category(category).await?
            }
            _ => self.store.all_products().await?,
        };
        Ok(products)
    }

    /// Removes `quantity` units from stock and returns the updated product.
    #[tracing::instrument(skip(self))]
    pub async fn decrement_stock(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        let key = stock_lock_key(product_id);
        let result = with_lock(self.locks.as_ref(), &key, self.lock_options, |lease| async move {
            let mut product = self
                .store
                .find_product(product_id)
                .await?
                .ok_or(ShopError::ProductNotFound(product_id))?;

            product
                .decrement_stock(quantity)
                .map_err(|e| stock_error(product_id, e))?;
            lease.ensure_held()?;
            self.store.save_product(&product).await?;
            Ok::<_, ShopError>(product)
        })
        .await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ShopError::InsufficientStock { .. }) => "insufficient",
            Err(ShopError::LockUnavailable { .. }) => "lock_timeout",
            Err(_) => "error",
        };
        metrics::counter!("stock_decrements_total", "outcome" => outcome).increment(1);

        let product = result?;
        self.cache.invalidate(&product_id).await;
        debug!(remaining = product.stock_quantity, "Stock decremented");
        Ok(product)
    }

    /// Adds `quantity` units to stock and returns the updated product.
    #[tracing::instrument(skip(self))]
    pub async fn restock(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        let key = stock_lock_key(product_id);
        let product = with_lock(self.locks.as_ref(), &key, self.lock_options, |lease| async move {
            let mut product = self
                .store
                .find_product(product_id)
                .await?
                .ok_or(ShopError::ProductNotFound(product_id))?;

            product
                .add_stock(quantity)
                .map_err(|e| stock_error(product_id, e))?;
            lease.ensure_held()?;
            self.store.save_product(&product).await?;
            Ok::<_, ShopError>(product)
        })
        .await?;

        self.cache.invalidate(&product_id).await;
        info!(stock = product.stock_quantity, "Product restocked");
        Ok(product)
    }
}
