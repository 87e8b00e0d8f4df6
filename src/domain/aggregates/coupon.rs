//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Money;
use crate::{EngineError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub kind: DiscountKind,
    /// Percent for `Percentage`, currency amount for `Fixed`.
    pub value: Decimal,
    pub min_amount: Money,
    pub max_discount: Option<Money>,
    pub max_usage: u32,
    pub usage_count: u32,
    pub status: CouponStatus,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind { Percentage, Fixed }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponStatus { #[default] Active, Inactive }

impl Coupon {
    pub fn percentage(code: impl Into<String>, percent: Decimal, max_discount: Option<Money>, valid_from: DateTime<Utc>, valid_to: DateTime<Utc>) -> Self {
        Self::build(code.into(), DiscountKind::Percentage, percent, max_discount, valid_from, valid_to)
    }

    pub fn fixed(code: impl Into<String>, amount: Money, valid_from: DateTime<Utc>, valid_to: DateTime<Utc>) -> Self {
        Self::build(code.into(), DiscountKind::Fixed, amount.amount(), None, valid_from, valid_to)
    }

    fn build(code: String, kind: DiscountKind, value: Decimal, max_discount: Option<Money>, valid_from: DateTime<Utc>, valid_to: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), code: normalize_code(&code), kind, value, min_amount: Money::ZERO, max_discount,
            max_usage: u32::MAX, usage_count: 0, status: CouponStatus::Active, valid_from, valid_to,
        }
    }

    pub fn with_min_amount(mut self, min: Money) -> Self { self.min_amount = min; self }
    pub fn with_max_usage(mut self, max: u32) -> Self { self.max_usage = max; self }

    pub fn validate(&self, subtotal: Money, now: DateTime<Utc>) -> Result<()> {
        if self.status != CouponStatus::Active || now < self.valid_from {
            return Err(EngineError::CouponInvalid(self.code.clone()));
        }
        if now > self.valid_to {
            return Err(EngineError::CouponExpired(self.code.clone()));
        }
        if subtotal < self.min_amount {
            return Err(EngineError::AmountTooLow { amount: subtotal.to_string(), minimum: self.min_amount.to_string() });
        }
        if self.usage_count >= self.max_usage {
            return Err(EngineError::CouponExhausted(self.code.clone()));
        }
        Ok(())
    }

    /// Discount for `subtotal`, never above the cap or the subtotal itself.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        let computed = match self.kind {
            DiscountKind::Percentage => {
                let d = subtotal.percent(self.value);
                self.max_discount.map_or(d, |cap| d.min(cap))
            }
            DiscountKind::Fixed => Money::new(self.value),
        };
        computed.min(subtotal)
    }

    pub fn consume(&mut self) -> Result<()> {
        if self.usage_count >= self.max_usage {
            return Err(EngineError::CouponExhausted(self.code.clone()));
        }
        self.usage_count += 1;
        Ok(())
    }
}

pub fn normalize_code(code: &str) -> String { code.trim().to_uppercase() }
