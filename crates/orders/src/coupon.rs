//! Coupon catalog, discount calculation and quota consumption.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CouponId, MemberId};
use distributed_lock::{LockManager, LockOptions, with_lock};
use domain::{Coupon, CouponError, Money};
use store::{COUPON_CODE_CONSTRAINT, CouponRepository};
use tracing::info;

use crate::cache::ReadThroughCache;
use crate::error::{Result, ShopError};

/// Lock key guarding the remaining quantity of one coupon.
pub fn coupon_lock_key(coupon_id: CouponId) -> String {
    format!("coupon:lock:{coupon_id}")
}

fn coupon_error(coupon_id: CouponId, error: CouponError) -> ShopError {
    match error {
        CouponError::NotAvailable => ShopError::CouponNotAvailable(coupon_id),
        CouponError::QuotaExceeded => ShopError::CouponQuotaExceeded(coupon_id),
    }
}

pub struct CouponService<S, L> {
    store: Arc<S>,
    locks: Arc<L>,
    lock_options: LockOptions,
    cache: ReadThroughCache<CouponId, Coupon>,
}

impl<S, L> CouponService<S, L>
where
    S: CouponRepository,
    L: LockManager,
{
    pub fn new(store: Arc<S>, locks: Arc<L>) -> Self {
        Self {
            store,
            locks,
            lock_options: LockOptions::default(),
            cache: ReadThroughCache::new("coupon"),
        }
    }

    pub fn with_lock_options(mut self, options: LockOptions) -> Self {
        self.lock_options = options;
        self
    }

    #[tracing::instrument(skip(self, coupon), fields(code = %coupon.code))]
    pub async fn create_coupon(&self, coupon: Coupon) -> Result<Coupon> {
        if coupon.code.trim().is_empty() {
            return Err(ShopError::InvalidInput("coupon code is required".into()));
        }
        if coupon.discount_value < 0 {
            return Err(ShopError::InvalidInput(format!(
                "discount value cannot be negative: {}",
                coupon.discount_value
            )));
        }
        if coupon.valid_until < coupon.valid_from {
            return Err(ShopError::InvalidInput(
                "coupon validity ends before it starts".into(),
            ));
        }
        if self.store.find_coupon_by_code(&coupon.code).await?.is_some() {
            return Err(ShopError::CouponCodeTaken {
                code: coupon.code.clone(),
            });
        }

        self.store.save_coupon(&coupon).await.map_err(|e| {
            if e.unique_constraint() == Some(COUPON_CODE_CONSTRAINT) {
                ShopError::CouponCodeTaken {
                    code: coupon.code.clone(),
                }
            } else {
                ShopError::from(e)
            }
        })?;

        info!(coupon_id = %coupon.id, "Coupon created");
        Ok(coupon)
    }

    pub async fn get_coupon(&self, coupon_id: CouponId) -> Result<Coupon> {
        self.cache
            .get_or_load(&coupon_id, || self.store.find_coupon(coupon_id))
            .await?
            .ok_or(ShopError::CouponNotFound(coupon_id))
    }

    /// Coupons that can be applied at `now`.
    pub async fn active_coupons(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>> {
        Ok(self.store.active_coupons(now).await?)
    }

    /// Returns the discount the coupon grants on `order_amount`.
    ///
    /// Checks validity but does not consume the coupon.
    #[tracing::instrument(skip(self))]
    pub async fn apply_discount(&self, coupon_id: CouponId, order_amount: Money) -> Result<Money> {
        let coupon = self.get_coupon(coupon_id).await?;
        coupon
            .ensure_valid(Utc::now())
            .map_err(|e| coupon_error(coupon_id, e))?;
        Ok(coupon.calculate_discount(order_amount))
    }

    /// Uses up one coupon from the remaining quantity.
    #[tracing::instrument(skip(self))]
    pub async fn use_coupon(&self, coupon_id: CouponId, member_id: MemberId) -> Result<Coupon> {
        let key = coupon_lock_key(coupon_id);
        let coupon = with_lock(self.locks.as_ref(), &key, self.lock_options, |lease| async move {
            let mut coupon = self
                .store
                .find_coupon(coupon_id)
                .await?
                .ok_or(ShopError::CouponNotFound(coupon_id))?;

            coupon.consume().map_err(|e| coupon_error(coupon_id, e))?;
            lease.ensure_held()?;
            self.store.save_coupon(&coupon).await?;
            Ok::<_, ShopError>(coupon)
        })
        .await?;

        self.cache.invalidate(&coupon_id).await;
        info!(remaining = ?coupon.remaining_quantity, "Coupon used");
        Ok(coupon)
    }
}
