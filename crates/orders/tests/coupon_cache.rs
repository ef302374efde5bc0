//! Cached coupon reads racing quota consumption.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{CouponId, MemberId};
use distributed_lock::InMemoryLockManager;
use domain::{Coupon, CouponStatus, DiscountType, Money};
use orders::{CouponService, ShopError};
use store::{CouponRepository, InMemoryShopStore};
use tokio::sync::Notify;

/// Coupon store whose next read parks after fetching the row.
#[derive(Default)]
struct PausingStore {
    inner: InMemoryShopStore,
    pause_next_read: AtomicBool,
    parked: Notify,
    resume: Notify,
}

#[async_trait]
impl CouponRepository for PausingStore {
    async fn find_coupon(&self, id: CouponId) -> store::Result<Option<Coupon>> {
        let coupon = self.inner.find_coupon(id).await?;
        if self.pause_next_read.swap(false, Ordering::SeqCst) {
            self.parked.notify_one();
            self.resume.notified().await;
        }
        Ok(coupon)
    }

    async fn find_coupon_by_code(&self, code: &str) -> store::Result<Option<Coupon>> {
        self.inner.find_coupon_by_code(code).await
    }

    async fn active_coupons(&self, now: DateTime<Utc>) -> store::Result<Vec<Coupon>> {
        self.inner.active_coupons(now).await
    }

    async fn save_coupon(&self, coupon: &Coupon) -> store::Result<()> {
        self.inner.save_coupon(coupon).await
    }
}

fn single_use_coupon() -> Coupon {
    let now = Utc::now();
    Coupon::new(
        "ONCE",
        "One thousand off, once",
        DiscountType::Fixed,
        1_000,
        Money::zero(),
        now - Duration::days(1),
        now + Duration::days(1),
    )
    .with_quantity(1)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_started_before_consumption_is_not_cached() {
    let store = Arc::new(PausingStore::default());
    let coupons = Arc::new(CouponService::new(
        store.clone(),
        Arc::new(InMemoryLockManager::new()),
    ));
    let coupon = coupons.create_coupon(single_use_coupon()).await.unwrap();

    store.pause_next_read.store(true, Ordering::SeqCst);
    let reader = tokio::spawn({
        let coupons = coupons.clone();
        async move { coupons.apply_discount(coupon.id, Money::new(10_000)).await }
    });
    store.parked.notified().await;

    let used = coupons.use_coupon(coupon.id, MemberId::new()).await.unwrap();
    assert_eq!(used.remaining_quantity, Some(0));
    assert_eq!(used.status, CouponStatus::Depleted);

    store.resume.notify_one();
    // The overlapping read saw the coupon before it was used up.
    assert_eq!(reader.await.unwrap().unwrap(), Money::new(1_000));

    let later = coupons
        .apply_discount(coupon.id, Money::new(10_000))
        .await
        .unwrap_err();
    assert!(matches!(later, ShopError::CouponNotAvailable(id) if id == coupon.id));
    assert_eq!(
        coupons.get_coupon(coupon.id).await.unwrap().status,
        CouponStatus::Depleted
    );
}
