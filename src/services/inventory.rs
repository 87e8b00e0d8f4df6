//! Inventory ledger: reserve / confirm / release per product.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::aggregates::{merge_quantities, InventoryLevels, Product};
use crate::domain::events::{DomainEvent, InventoryEvent};
use crate::notify::NotificationSink;
use crate::store::{Guard, Store};
use crate::{EngineError, Result};

#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<Store>,
    sink: Arc<dyn NotificationSink>,
}

impl InventoryLedger {
    pub fn new(store: Arc<Store>, sink: Arc<dyn NotificationSink>) -> Self { Self { store, sink } }

    pub async fn levels(&self, product_id: Uuid) -> Result<InventoryLevels> {
        Ok(self.store.products.lock(&product_id).await?.inventory)
    }

    pub async fn reserve(&self, product_id: Uuid, qty: u32) -> Result<InventoryLevels> {
        let mut product = self.store.products.lock(&product_id).await?;
        product.reserve(qty)?;
        debug!(product_id = %product_id, qty, available = product.inventory.available, "reserved stock");
        self.check_low_stock(&product);
        Ok(product.inventory)
    }

    pub async fn confirm(&self, product_id: Uuid, qty: u32) -> Result<InventoryLevels> {
        let mut product = self.store.products.lock(&product_id).await?;
        product.confirm(qty)?;
        debug!(product_id = %product_id, qty, total = product.inventory.total, "confirmed stock");
        Ok(product.inventory)
    }

    pub async fn release(&self, product_id: Uuid, qty: u32) -> Result<InventoryLevels> {
        let mut product = self.store.products.lock(&product_id).await?;
        product.release(qty)?;
        debug!(product_id = %product_id, qty, available = product.inventory.available, "released stock");
        Ok(product.inventory)
    }

    pub async fn restock(&self, product_id: Uuid, qty: u32) -> Result<InventoryLevels> {
        let mut product = self.store.products.lock(&product_id).await?;
        product.restock(qty)?;
        info!(product_id = %product_id, qty, total = product.inventory.total, "restocked product");
        Ok(product.inventory)
    }

    /// Reserves every line or none. Products are locked in ascending id order;
    /// on the first failure everything reserved so far is released again.
    pub async fn reserve_all(&self, lines: &[(Uuid, u32)]) -> Result<()> {
        let lines = merge_quantities(lines.iter().copied())?;
        let ids: Vec<Uuid> = lines.iter().map(|(id, _)| *id).collect();
        let mut guards = self.store.products.lock_many(&ids).await?;
        let mut reserved: Vec<(usize, u32)> = Vec::with_capacity(lines.len());
        for (product_id, qty) in lines {
            let idx = position(&guards, product_id)?;
            if let Err(err) = guards[idx].1.reserve(qty) {
                for (done_idx, done_qty) in reserved.into_iter().rev() {
                    guards[done_idx].1.release(done_qty)?;
                }
                warn!(product_id = %product_id, qty, error = %err, "reservation rolled back");
                return Err(err);
            }
            reserved.push((idx, qty));
        }
        for (_, product) in &guards { self.check_low_stock(product); }
        Ok(())
    }

    pub async fn confirm_all(&self, lines: &[(Uuid, u32)]) -> Result<()> {
        self.apply_all(lines, |product, qty| {
            if product.inventory.reserved < qty {
                return Err(EngineError::InvalidState(format!("product {} has {} reserved, cannot confirm {}", product.id, product.inventory.reserved, qty)));
            }
            Ok(())
        }, Product::confirm).await
    }

    pub async fn release_all(&self, lines: &[(Uuid, u32)]) -> Result<()> {
        self.apply_all(lines, |product, qty| {
            if product.inventory.reserved < qty {
                return Err(EngineError::InvalidState(format!("product {} has {} reserved, cannot release {}", product.id, product.inventory.reserved, qty)));
            }
            Ok(())
        }, Product::release).await
    }

    pub async fn restock_all(&self, lines: &[(Uuid, u32)]) -> Result<()> {
        self.apply_all(lines, |_, _| Ok(()), Product::restock).await
    }

    /// Checks every line under the locks before mutating any of them.
    async fn apply_all(
        &self,
        lines: &[(Uuid, u32)],
        check: impl Fn(&Product, u32) -> Result<()>,
        apply: impl Fn(&mut Product, u32) -> Result<()>,
    ) -> Result<()> {
        let lines = merge_quantities(lines.iter().copied())?;
        let ids: Vec<Uuid> = lines.iter().map(|(id, _)| *id).collect();
        let mut guards = self.store.products.lock_many(&ids).await?;
        for (product_id, qty) in &lines {
            let idx = position(&guards, *product_id)?;
            check(&*guards[idx].1, *qty)?;
        }
        for (product_id, qty) in lines {
            let idx = position(&guards, product_id)?;
            apply(&mut *guards[idx].1, qty)?;
        }
        Ok(())
    }

    fn check_low_stock(&self, product: &Product) {
        if product.inventory.is_low() {
            self.sink.publish(DomainEvent::Inventory(InventoryEvent::LowStock {
                product_id: product.id, available: product.inventory.available, threshold: product.inventory.threshold,
            }));
        }
    }
}

fn position(guards: &[(Uuid, Guard<Product>)], product_id: Uuid) -> Result<usize> {
    guards.iter().position(|(id, _)| *id == product_id)
        .ok_or_else(|| EngineError::invariant(format!("product {} locked but missing from guard set", product_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Money;
    use crate::notify::MemorySink;
    use tokio::task::JoinSet;

    fn ledger() -> (InventoryLedger, Arc<Store>, Arc<MemorySink>) {
        let store = Arc::new(Store::new());
        let sink = Arc::new(MemorySink::new());
        (InventoryLedger::new(store.clone(), sink.clone()), store, sink)
    }

    fn add_product(store: &Store, stock: u32) -> Uuid {
        let p = Product::create("Widget", Money::from_major(10), stock, 0);
        let id = p.id;
        store.products.insert(id, p);
        id
    }

    #[tokio::test]
    async fn test_reserve_confirm_release() {
        let (ledger, store, _) = ledger();
        let id = add_product(&store, 10);
        ledger.reserve(id, 3).await.unwrap();
        ledger.confirm(id, 2).await.unwrap();
        let levels = ledger.release(id, 1).await.unwrap();
        assert_eq!((levels.total, levels.available, levels.reserved), (8, 8, 0));
        assert!(matches!(ledger.release(id, 1).await, Err(EngineError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_reserve_all_rolls_back() {
        let (ledger, store, _) = ledger();
        let plenty = add_product(&store, 10);
        let scarce = add_product(&store, 1);
        let err = ledger.reserve_all(&[(plenty, 4), (scarce, 2)]).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientStock { .. }));
        assert_eq!(ledger.levels(plenty).await.unwrap(), InventoryLevels::new(10, 0));
        assert_eq!(ledger.levels(scarce).await.unwrap(), InventoryLevels::new(1, 0));
    }

    #[tokio::test]
    async fn test_repeated_lines_cannot_wrap_quantity() {
        let (ledger, store, _) = ledger();
        let id = add_product(&store, 10);
        let err = ledger.reserve_all(&[(id, u32::MAX), (id, 2)]).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(ledger.levels(id).await.unwrap(), InventoryLevels::new(10, 0));
        ledger.reserve_all(&[(id, 3), (id, 4)]).await.unwrap();
        assert_eq!(ledger.levels(id).await.unwrap().reserved, 7);
    }

    #[tokio::test]
    async fn test_unknown_product_reserves_nothing() {
        let (ledger, store, _) = ledger();
        let id = add_product(&store, 10);
        assert!(matches!(ledger.reserve_all(&[(id, 1), (Uuid::now_v7(), 1)]).await, Err(EngineError::NotFound { .. })));
        assert_eq!(ledger.levels(id).await.unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_low_stock_event() {
        let (ledger, store, sink) = ledger();
        let p = Product::create("Widget", Money::from_major(10), 5, 2);
        let id = p.id;
        store.products.insert(id, p);
        ledger.reserve(id, 2).await.unwrap();
        assert_eq!(sink.count("inventory.low_stock"), 0);
        ledger.reserve(id, 1).await.unwrap();
        assert_eq!(sink.count("inventory.low_stock"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reserve_never_oversells() {
        let (ledger, store, _) = ledger();
        let id = add_product(&store, 7);
        let mut set = JoinSet::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            set.spawn(async move { ledger.reserve(id, 1).await });
        }
        let mut ok = 0;
        while let Some(res) = set.join_next().await {
            if res.unwrap().is_ok() { ok += 1; }
        }
        assert_eq!(ok, 7);
        let levels = ledger.levels(id).await.unwrap();
        assert_eq!((levels.available, levels.reserved), (0, 7));
        assert!(levels.is_consistent());
    }
}
