//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Money;
use crate::{EngineError, Result};

/// Stock counters. `available + reserved <= total` holds after every mutation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLevels {
    pub total: u32,
    pub available: u32,
    pub reserved: u32,
    pub threshold: u32,
}

impl InventoryLevels {
    pub fn new(total: u32, threshold: u32) -> Self {
        Self { total, available: total, reserved: 0, threshold }
    }

    pub fn is_consistent(&self) -> bool {
        u64::from(self.available) + u64::from(self.reserved) <= u64::from(self.total)
    }

    pub fn is_low(&self) -> bool { self.available <= self.threshold }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    pub status: ProductStatus,
    pub inventory: InventoryLevels,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus { #[default] Active, Archived }

impl Product {
    pub fn create(name: impl Into<String>, price: Money, stock: u32, threshold: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.into(), price, status: ProductStatus::Active,
            inventory: InventoryLevels::new(stock, threshold), created_at: now, updated_at: now,
        }
    }

    /// Moves `qty` from available to reserved.
    pub fn reserve(&mut self, qty: u32) -> Result<()> {
        if self.status != ProductStatus::Active {
            return Err(EngineError::Validation(format!("product {} is not on sale", self.id)));
        }
        let inv = self.inventory;
        if inv.available < qty {
            return Err(EngineError::InsufficientStock { product_id: self.id.to_string(), available: inv.available, requested: qty });
        }
        let reserved = inv.reserved.checked_add(qty).ok_or_else(|| self.overflow("reserved"))?;
        self.commit(InventoryLevels { available: inv.available - qty, reserved, ..inv })
    }

    /// Consumes `qty` reserved units permanently.
    pub fn confirm(&mut self, qty: u32) -> Result<()> {
        let inv = self.inventory;
        if inv.reserved < qty {
            return Err(EngineError::InvalidState(format!("product {} has {} reserved, cannot confirm {}", self.id, inv.reserved, qty)));
        }
        let total = inv.total.checked_sub(qty).ok_or_else(|| self.overflow("total"))?;
        self.commit(InventoryLevels { total, reserved: inv.reserved - qty, ..inv })
    }

    /// Returns `qty` reserved units to available.
    pub fn release(&mut self, qty: u32) -> Result<()> {
        let inv = self.inventory;
        if inv.reserved < qty {
            return Err(EngineError::InvalidState(format!("product {} has {} reserved, cannot release {}", self.id, inv.reserved, qty)));
        }
        let available = inv.available.checked_add(qty).ok_or_else(|| self.overflow("available"))?;
        self.commit(InventoryLevels { available, reserved: inv.reserved - qty, ..inv })
    }

    /// Adds fresh units to the catalog.
    pub fn restock(&mut self, qty: u32) -> Result<()> {
        let inv = self.inventory;
        let total = inv.total.checked_add(qty).ok_or_else(|| self.overflow("total"))?;
        let available = inv.available.checked_add(qty).ok_or_else(|| self.overflow("available"))?;
        self.commit(InventoryLevels { total, available, ..inv })
    }

    fn commit(&mut self, next: InventoryLevels) -> Result<()> {
        if !next.is_consistent() {
            return Err(EngineError::invariant(format!(
                "product {}: available {} + reserved {} > total {}", self.id, next.available, next.reserved, next.total
            )));
        }
        self.inventory = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn overflow(&self, counter: &str) -> EngineError {
        EngineError::invariant(format!("product {}: {} counter out of range", self.id, counter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stock: u32) -> Product { Product::create("Widget", Money::from_major(10), stock, 2) }

    #[test]
    fn test_reserve_confirm_release_cycle() {
        let mut p = product(10);
        p.reserve(4).unwrap();
        assert_eq!(p.inventory, InventoryLevels { total: 10, available: 6, reserved: 4, threshold: 2 });
        p.confirm(3).unwrap();
        assert_eq!(p.inventory, InventoryLevels { total: 7, available: 6, reserved: 1, threshold: 2 });
        p.release(1).unwrap();
        assert_eq!(p.inventory, InventoryLevels { total: 7, available: 7, reserved: 0, threshold: 2 });
    }

    #[test]
    fn test_reserve_insufficient_leaves_counters() {
        let mut p = product(3);
        let err = p.reserve(4).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientStock { available: 3, requested: 4, .. }));
        assert_eq!(p.inventory.available, 3);
        assert_eq!(p.inventory.reserved, 0);
    }

    #[test]
    fn test_confirm_and_release_require_reservation() {
        let mut p = product(5);
        assert!(matches!(p.confirm(1), Err(EngineError::InvalidState(_))));
        assert!(matches!(p.release(1), Err(EngineError::InvalidState(_))));
    }

    #[test]
    fn test_corrupt_counters_surface_invariant() {
        let mut p = product(5);
        p.inventory.reserved = 3;
        assert!(matches!(p.release(2), Err(EngineError::InvariantViolated(_))));
        assert_eq!(p.inventory.reserved, 3);
    }

    #[test]
    fn test_low_stock() {
        let mut p = product(3);
        assert!(!p.inventory.is_low());
        p.reserve(1).unwrap();
        assert!(p.inventory.is_low());
    }
}
