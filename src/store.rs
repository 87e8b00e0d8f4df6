//! Sharded in-memory key-value store
//!
//! Every entity lives behind its own async mutex; the index is a `DashMap`
//! so lookups for different keys never serialize on a single lock.
//!
//! Lock order, outermost first: order, coupon, product, flash sale / group,
//! activity, user. Multi-product work goes through [`Table::lock_many`],
//! which acquires keys in ascending id order.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::aggregates::{Coupon, FlashSale, GroupBuyingActivity, GroupBuyingGroup, Order, Product, User};
use crate::{EngineError, Result};

pub type Guard<V> = OwnedMutexGuard<V>;

pub struct Table<K, V> {
    entity: &'static str,
    rows: DashMap<K, Arc<Mutex<V>>>,
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash + Ord + Copy + ToString,
{
    pub fn new(entity: &'static str) -> Self { Self { entity, rows: DashMap::new() } }

    pub fn entity(&self) -> &'static str { self.entity }

    pub fn insert(&self, key: K, value: V) {
        self.rows.insert(key, Arc::new(Mutex::new(value)));
    }

    pub fn contains(&self, key: &K) -> bool { self.rows.contains_key(key) }

    fn cell(&self, key: &K) -> Result<Arc<Mutex<V>>> {
        // The shard guard is dropped before any await on the entity lock.
        self.rows.get(key).map(|r| Arc::clone(r.value())).ok_or_else(|| EngineError::not_found(self.entity, key.to_string()))
    }

    /// Exclusive critical section over one entity.
    pub async fn lock(&self, key: &K) -> Result<Guard<V>> {
        Ok(self.cell(key)?.lock_owned().await)
    }

    /// Locks several entities in ascending key order. Duplicate keys are locked once.
    pub async fn lock_many(&self, keys: &[K]) -> Result<Vec<(K, Guard<V>)>> {
        let mut keys = keys.to_vec();
        keys.sort_unstable();
        keys.dedup();
        let cells = keys.iter().map(|k| self.cell(k).map(|c| (*k, c))).collect::<Result<Vec<_>>>()?;
        let mut guards = Vec::with_capacity(cells.len());
        for (key, cell) in cells {
            guards.push((key, cell.lock_owned().await));
        }
        Ok(guards)
    }

    pub fn keys(&self) -> Vec<K> { self.rows.iter().map(|r| *r.key()).collect() }

    pub fn len(&self) -> usize { self.rows.len() }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash + Ord + Copy + ToString,
    V: Clone,
{
    pub async fn snapshot(&self, key: &K) -> Result<V> {
        Ok(self.lock(key).await?.clone())
    }
}

/// Fixed schema, built once at startup.
pub struct Store {
    pub products: Table<Uuid, Product>,
    pub orders: Table<Uuid, Order>,
    pub coupons: Table<Uuid, Coupon>,
    pub coupon_codes: DashMap<String, Uuid>,
    pub flash_sales: Table<Uuid, FlashSale>,
    pub activities: Table<Uuid, GroupBuyingActivity>,
    pub groups: Table<Uuid, GroupBuyingGroup>,
    pub users: Table<Uuid, User>,
    order_seq: AtomicU64,
}

impl Store {
    pub fn new() -> Self {
        Self {
            products: Table::new("product"),
            orders: Table::new("order"),
            coupons: Table::new("coupon"),
            coupon_codes: DashMap::new(),
            flash_sales: Table::new("flash sale"),
            activities: Table::new("group buying activity"),
            groups: Table::new("group"),
            users: Table::new("user"),
            order_seq: AtomicU64::new(0),
        }
    }

    pub fn next_order_seq(&self) -> u64 { self.order_seq.fetch_add(1, Ordering::Relaxed) + 1 }

    /// Registers a coupon under its code. Codes are unique.
    pub fn insert_coupon(&self, coupon: Coupon) -> Result<()> {
        match self.coupon_codes.entry(coupon.code.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(EngineError::Validation(format!("coupon code {} already exists", coupon.code)))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(coupon.id);
                self.coupons.insert(coupon.id, coupon);
                Ok(())
            }
        }
    }

    pub fn coupon_id(&self, code: &str) -> Result<Uuid> {
        self.coupon_codes.get(code).map(|r| *r.value()).ok_or_else(|| EngineError::CouponInvalid(code.to_string()))
    }
}

impl Default for Store {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Money;

    #[tokio::test]
    async fn test_lock_many_sorts_and_dedups() {
        let table: Table<Uuid, u32> = Table::new("counter");
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        table.insert(a, 1);
        table.insert(b, 2);
        let guards = table.lock_many(&[b, a, b]).await.unwrap();
        let keys: Vec<Uuid> = guards.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![a.min(b), a.max(b)]);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let table: Table<Uuid, u32> = Table::new("counter");
        let err = table.lock(&Uuid::nil()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "counter", .. }));
    }

    #[test]
    fn test_coupon_codes_unique() {
        let store = Store::new();
        let now = chrono::Utc::now();
        store.insert_coupon(Coupon::fixed("SAVE", Money::from_major(5), now, now)).unwrap();
        assert!(store.insert_coupon(Coupon::fixed("save", Money::from_major(5), now, now)).is_err());
        assert!(store.coupon_id("SAVE").is_ok());
    }
}
