//! Coupon validation and redemption.

use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::domain::aggregates::coupon::normalize_code;
use crate::domain::aggregates::Coupon;
use crate::domain::value_objects::Money;
use crate::store::{Guard, Store};
use crate::Result;

#[derive(Clone)]
pub struct CouponEngine {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

/// A coupon held under its lock for the length of an order's unit of work.
/// Dropping it without [`Redemption::commit`] leaves the usage count untouched.
pub struct Redemption {
    coupon: Guard<Coupon>,
    discount: Money,
}

impl Redemption {
    pub fn discount(&self) -> Money { self.discount }
    pub fn code(&self) -> &str { &self.coupon.code }

    pub fn commit(mut self) -> Result<Coupon> {
        self.coupon.consume()?;
        info!(coupon = %self.coupon.code, usage = self.coupon.usage_count, "coupon redeemed");
        Ok(self.coupon.clone())
    }
}

impl CouponEngine {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self { Self { store, clock } }

    /// Checks a code against `subtotal` without holding the coupon.
    pub async fn validate(&self, code: &str, subtotal: Money) -> Result<Coupon> {
        let code = normalize_code(code);
        let id = self.store.coupon_id(&code)?;
        let coupon = self.store.coupons.lock(&id).await?;
        coupon.validate(subtotal, self.clock.now())?;
        Ok(coupon.clone())
    }

    pub fn apply(&self, coupon: &Coupon, subtotal: Money) -> Money { coupon.discount_for(subtotal) }

    pub async fn consume(&self, coupon: &Coupon) -> Result<Coupon> {
        let mut locked = self.store.coupons.lock(&coupon.id).await?;
        locked.consume()?;
        Ok(locked.clone())
    }

    /// Locks, validates and prices a coupon. The lock is held until the
    /// returned redemption is committed or dropped.
    pub async fn begin(&self, code: &str, subtotal: Money) -> Result<Redemption> {
        let code = normalize_code(code);
        let id = self.store.coupon_id(&code)?;
        let coupon = self.store.coupons.lock(&id).await?;
        coupon.validate(subtotal, self.clock.now())?;
        let discount = coupon.discount_for(subtotal);
        debug!(coupon = %code, subtotal = %subtotal, discount = %discount, "coupon validated");
        Ok(Redemption { coupon, discount })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::EngineError;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use tokio::task::JoinSet;

    fn engine_with(coupon: Coupon) -> (CouponEngine, Arc<Store>) {
        let store = Arc::new(Store::new());
        store.insert_coupon(coupon).unwrap();
        (CouponEngine::new(store.clone(), Arc::new(SystemClock)), store)
    }

    fn half_off() -> Coupon {
        let now = Utc::now();
        Coupon::percentage("HALF", Decimal::from(50), Some(Money::from_major(50)), now - Duration::days(1), now + Duration::days(1))
            .with_min_amount(Money::from_major(100))
    }

    #[tokio::test]
    async fn test_validate_and_apply() {
        let (engine, _) = engine_with(half_off());
        let coupon = engine.validate(" half ", Money::from_major(1000)).await.unwrap();
        assert_eq!(engine.apply(&coupon, Money::from_major(1000)), Money::from_major(50));
        assert!(matches!(engine.validate("HALF", Money::from_major(10)).await, Err(EngineError::AmountTooLow { .. })));
        assert!(matches!(engine.validate("NOPE", Money::from_major(1000)).await, Err(EngineError::CouponInvalid(_))));
    }

    #[tokio::test]
    async fn test_dropped_redemption_does_not_count() {
        let (engine, store) = engine_with(half_off().with_max_usage(1));
        let redemption = engine.begin("HALF", Money::from_major(200)).await.unwrap();
        assert_eq!(redemption.discount(), Money::from_major(50));
        drop(redemption);
        let id = store.coupon_id("HALF").unwrap();
        assert_eq!(store.coupons.snapshot(&id).await.unwrap().usage_count, 0);
        engine.begin("HALF", Money::from_major(200)).await.unwrap().commit().unwrap();
        assert!(matches!(engine.begin("HALF", Money::from_major(200)).await, Err(EngineError::CouponExhausted(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redemption_respects_max_usage() {
        let (engine, store) = engine_with(half_off().with_max_usage(3));
        let mut set = JoinSet::new();
        for _ in 0..12 {
            let engine = engine.clone();
            set.spawn(async move { engine.begin("HALF", Money::from_major(500)).await?.commit() });
        }
        let mut ok = 0;
        while let Some(res) = set.join_next().await {
            if res.unwrap().is_ok() { ok += 1; }
        }
        assert_eq!(ok, 3);
        let id = store.coupon_id("HALF").unwrap();
        assert_eq!(store.coupons.snapshot(&id).await.unwrap().usage_count, 3);
    }
}
