//! User Aggregate (referral and loyalty fields)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Money;
use crate::{EngineError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role { #[default] Customer, Merchant, Admin }

impl Role {
    pub fn is_staff(self) -> bool { matches!(self, Self::Merchant | Self::Admin) }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub points: u64,
    pub wallet: Money,
    /// Weak link to the user who referred this one.
    pub referrer_id: Option<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub profile: UserProfile,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn register(username: impl Into<String>, role: Role, referrer_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::now_v7(), username: username.into(), role,
            profile: UserProfile { referrer_id, ..Default::default() }, created_at: Utc::now(),
        }
    }

    pub fn credit_wallet(&mut self, amount: Money) -> Result<()> {
        if amount.is_negative() {
            return Err(EngineError::invariant(format!("negative wallet credit {} for user {}", amount, self.id)));
        }
        self.profile.wallet += amount;
        Ok(())
    }

    pub fn credit_points(&mut self, points: u64) -> Result<()> {
        self.profile.points = self.profile.points.checked_add(points)
            .ok_or_else(|| EngineError::invariant(format!("points overflow for user {}", self.id)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credits() {
        let mut u = User::register("alice", Role::Customer, None);
        u.credit_wallet(Money::from_major(50)).unwrap();
        u.credit_points(10).unwrap();
        assert_eq!(u.profile.wallet, Money::from_major(50));
        assert_eq!(u.profile.points, 10);
        assert!(u.credit_points(u64::MAX).is_err());
        assert_eq!(u.profile.points, 10);
    }
}
