//! OpenSASE Commerce Engine
//!
//! Transactional core that turns carts into committed orders.
//!
//! ## Features
//! - Per-product inventory ledger (reserve / confirm / release)
//! - Coupon validation and redemption
//! - Flash sales with per-user quotas
//! - Group buying with exactly-once completion
//! - Multi-level referral commissions
//! - Order lifecycle state machine

pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod http;
pub mod notify;
pub mod services;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::CommerceEngine;

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Stable, machine-readable error kind returned alongside every failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InsufficientStock,
    QuotaExceeded,
    PromotionNotStarted,
    PromotionEnded,
    CouponInvalid,
    CouponExpired,
    CouponExhausted,
    AmountTooLow,
    InvalidTransition,
    InvalidState,
    Unauthorized,
    AlreadyJoined,
    GroupFull,
    Validation,
    InvariantViolated,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock { product_id: String, available: u32, requested: u32 },

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Promotion {0} has not started")]
    PromotionNotStarted(String),

    #[error("Promotion {0} has ended")]
    PromotionEnded(String),

    #[error("Coupon {0} is not valid")]
    CouponInvalid(String),

    #[error("Coupon {0} has expired")]
    CouponExpired(String),

    #[error("Coupon {0} has no remaining uses")]
    CouponExhausted(String),

    #[error("Order amount {amount} is below the coupon minimum {minimum}")]
    AmountTooLow { amount: String, minimum: String },

    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition { order_id: String, from: String, to: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("User {user_id} already joined group {group_id}")]
    AlreadyJoined { user_id: String, group_id: String },

    #[error("Group {0} is not recruiting")]
    GroupFull(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Invariant violated: {0}")]
    InvariantViolated(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            Self::PromotionNotStarted(_) => ErrorKind::PromotionNotStarted,
            Self::PromotionEnded(_) => ErrorKind::PromotionEnded,
            Self::CouponInvalid(_) => ErrorKind::CouponInvalid,
            Self::CouponExpired(_) => ErrorKind::CouponExpired,
            Self::CouponExhausted(_) => ErrorKind::CouponExhausted,
            Self::AmountTooLow { .. } => ErrorKind::AmountTooLow,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::AlreadyJoined { .. } => ErrorKind::AlreadyJoined,
            Self::GroupFull(_) => ErrorKind::GroupFull,
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvariantViolated(_) => ErrorKind::InvariantViolated,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    /// Builds an invariant violation and reports it for operator alerting.
    pub(crate) fn invariant(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        tracing::error!(detail = %detail, "invariant violated");
        Self::InvariantViolated(detail)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_is_stable() {
        let err = EngineError::not_found("order", "42");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "order not found: 42");
        assert_eq!(serde_json::to_value(ErrorKind::CouponExhausted).unwrap(), "coupon_exhausted");
    }
}
