//! Flash Sale Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use crate::domain::value_objects::Money;
use crate::{EngineError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlashSale {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sale_price: Money,
    /// Units offered. `sold_count` never exceeds it.
    pub inventory: u32,
    pub sold_count: u32,
    pub purchased: HashMap<Uuid, u32>,
    pub limit_per_user: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: FlashSaleStatus,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashSaleStatus { #[default] Scheduled, Active, Ended, Cancelled }

impl FlashSale {
    pub fn schedule(product_id: Uuid, sale_price: Money, inventory: u32, limit_per_user: u32, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Result<Self> {
        if end_time <= start_time {
            return Err(EngineError::Validation("flash sale must end after it starts".into()));
        }
        if limit_per_user == 0 {
            return Err(EngineError::Validation("flash sale limit per user must be positive".into()));
        }
        Ok(Self {
            id: Uuid::now_v7(), product_id, sale_price, inventory, sold_count: 0, purchased: HashMap::new(),
            limit_per_user, start_time, end_time, status: FlashSaleStatus::Scheduled,
        })
    }

    /// Brings the stored status in line with the clock. Cancellation is sticky.
    pub fn refresh_status(&mut self, now: DateTime<Utc>) -> FlashSaleStatus {
        if self.status != FlashSaleStatus::Cancelled {
            self.status = if now < self.start_time {
                FlashSaleStatus::Scheduled
            } else if now > self.end_time {
                FlashSaleStatus::Ended
            } else {
                FlashSaleStatus::Active
            };
        }
        self.status
    }

    pub fn remaining(&self) -> u32 { self.inventory - self.sold_count }
    pub fn purchased_by(&self, user_id: Uuid) -> u32 { self.purchased.get(&user_id).copied().unwrap_or(0) }

    /// Tests both caps and records the purchase as one step; nothing changes on failure.
    pub fn admit(&mut self, user_id: Uuid, qty: u32, now: DateTime<Utc>) -> Result<()> {
        match self.refresh_status(now) {
            FlashSaleStatus::Scheduled => return Err(EngineError::PromotionNotStarted(self.id.to_string())),
            FlashSaleStatus::Ended | FlashSaleStatus::Cancelled => return Err(EngineError::PromotionEnded(self.id.to_string())),
            FlashSaleStatus::Active => {}
        }
        let sold = self.sold_count.checked_add(qty).filter(|s| *s <= self.inventory);
        let Some(sold) = sold else {
            return Err(EngineError::InsufficientStock { product_id: self.product_id.to_string(), available: self.remaining(), requested: qty });
        };
        let bought = self.purchased_by(user_id).checked_add(qty).filter(|b| *b <= self.limit_per_user);
        let Some(bought) = bought else {
            return Err(EngineError::QuotaExceeded(format!(
                "user {} may buy at most {} from flash sale {}", user_id, self.limit_per_user, self.id
            )));
        };
        self.sold_count = sold;
        self.purchased.insert(user_id, bought);
        Ok(())
    }

    /// Undoes an admission whose order could not be created.
    pub fn revoke(&mut self, user_id: Uuid, qty: u32) -> Result<()> {
        let bought = self.purchased_by(user_id);
        if bought < qty || self.sold_count < qty {
            return Err(EngineError::invariant(format!("flash sale {}: revoking {} more than admitted", self.id, qty)));
        }
        self.sold_count -= qty;
        if bought == qty { self.purchased.remove(&user_id); } else { self.purchased.insert(user_id, bought - qty); }
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        if self.status == FlashSaleStatus::Ended {
            return Err(EngineError::PromotionEnded(self.id.to_string()));
        }
        self.status = FlashSaleStatus::Cancelled;
        Ok(())
    }
}
