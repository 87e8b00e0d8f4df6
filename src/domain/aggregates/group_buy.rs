//! Group Buying Aggregates

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Money;
use crate::{EngineError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupBuyingActivity {
    pub id: Uuid,
    pub product_id: Uuid,
    pub group_size: u32,
    pub original_price: Money,
    pub group_price: Money,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_groups: u32,
    pub current_groups: u32,
    pub total_participants: u32,
}

impl GroupBuyingActivity {
    pub fn create(product_id: Uuid, group_size: u32, original_price: Money, group_price: Money, start_time: DateTime<Utc>, end_time: DateTime<Utc>, max_groups: u32) -> Result<Self> {
        if group_size < 2 { return Err(EngineError::Validation("group size must be at least 2".into())); }
        if end_time <= start_time { return Err(EngineError::Validation("activity must end after it starts".into())); }
        Ok(Self {
            id: Uuid::now_v7(), product_id, group_size, original_price, group_price, start_time, end_time,
            max_groups, current_groups: 0, total_participants: 0,
        })
    }

    pub fn ensure_open(&self, now: DateTime<Utc>) -> Result<()> {
        if now < self.start_time { return Err(EngineError::PromotionNotStarted(self.id.to_string())); }
        if now > self.end_time { return Err(EngineError::PromotionEnded(self.id.to_string())); }
        Ok(())
    }

    /// Counts a newly opened group against `max_groups`.
    pub fn open_group(&mut self) -> Result<()> {
        if self.current_groups >= self.max_groups {
            return Err(EngineError::QuotaExceeded(format!("activity {} reached its limit of {} groups", self.id, self.max_groups)));
        }
        self.current_groups += 1;
        Ok(())
    }

    pub fn record_participant(&mut self) { self.total_participants = self.total_participants.saturating_add(1); }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus { #[default] Recruiting, Completed, Expired }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Participant { pub user_id: Uuid, pub quantity: u32, pub joined_at: DateTime<Utc> }

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupBuyingGroup {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub leader_id: Uuid,
    pub participants: Vec<Participant>,
    pub required_size: u32,
    pub current_size: u32,
    pub status: GroupStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub order_ids: Vec<Uuid>,
}

/// Result of a successful join. `completed` is true for exactly one joiner per group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinOutcome { pub completed: bool }

impl GroupBuyingGroup {
    pub fn open(activity: &GroupBuyingActivity, leader_id: Uuid, quantity: u32, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::now_v7(), activity_id: activity.id, leader_id,
            participants: vec![Participant { user_id: leader_id, quantity, joined_at: now }],
            required_size: activity.group_size, current_size: 1, status: GroupStatus::Recruiting,
            expires_at: now + ttl, created_at: now, completed_at: None, order_ids: vec![],
        }
    }

    pub fn has_member(&self, user_id: Uuid) -> bool { self.participants.iter().any(|p| p.user_id == user_id) }

    /// Flips a stale recruiting group to expired. Returns true when it did.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == GroupStatus::Recruiting && now > self.expires_at {
            self.status = GroupStatus::Expired;
            return true;
        }
        false
    }

    pub fn join(&mut self, user_id: Uuid, quantity: u32, now: DateTime<Utc>) -> Result<JoinOutcome> {
        self.expire_if_due(now);
        if self.status != GroupStatus::Recruiting || self.current_size >= self.required_size {
            return Err(EngineError::GroupFull(self.id.to_string()));
        }
        if self.has_member(user_id) {
            return Err(EngineError::AlreadyJoined { user_id: user_id.to_string(), group_id: self.id.to_string() });
        }
        self.participants.push(Participant { user_id, quantity, joined_at: now });
        self.current_size += 1;
        let completed = self.current_size == self.required_size;
        if completed {
            self.status = GroupStatus::Completed;
            self.completed_at = Some(now);
        }
        Ok(JoinOutcome { completed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(size: u32, max_groups: u32) -> GroupBuyingActivity {
        let now = Utc::now();
        GroupBuyingActivity::create(Uuid::now_v7(), size, Money::from_major(100), Money::from_major(70), now - Duration::hours(1), now + Duration::days(3), max_groups).unwrap()
    }

    #[test]
    fn test_group_completes_exactly_at_size() {
        let a = activity(3, 10);
        let now = Utc::now();
        let mut g = GroupBuyingGroup::open(&a, Uuid::now_v7(), 1, now, Duration::hours(24));
        assert_eq!(g.join(Uuid::now_v7(), 1, now).unwrap(), JoinOutcome { completed: false });
        assert_eq!(g.join(Uuid::now_v7(), 2, now).unwrap(), JoinOutcome { completed: true });
        assert_eq!(g.status, GroupStatus::Completed);
        assert!(matches!(g.join(Uuid::now_v7(), 1, now), Err(EngineError::GroupFull(_))));
        assert_eq!(g.current_size, 3);
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let a = activity(3, 10);
        let leader = Uuid::now_v7();
        let mut g = GroupBuyingGroup::open(&a, leader, 1, Utc::now(), Duration::hours(24));
        assert!(matches!(g.join(leader, 1, Utc::now()), Err(EngineError::AlreadyJoined { .. })));
    }

    #[test]
    fn test_expiry() {
        let a = activity(2, 10);
        let now = Utc::now();
        let mut g = GroupBuyingGroup::open(&a, Uuid::now_v7(), 1, now, Duration::hours(24));
        assert!(!g.expire_if_due(now + Duration::hours(23)));
        let later = now + Duration::hours(25);
        assert!(matches!(g.join(Uuid::now_v7(), 1, later), Err(EngineError::GroupFull(_))));
        assert_eq!(g.status, GroupStatus::Expired);
    }

    #[test]
    fn test_activity_group_limit_and_window() {
        let mut a = activity(2, 1);
        a.open_group().unwrap();
        assert!(matches!(a.open_group(), Err(EngineError::QuotaExceeded(_))));
        assert!(matches!(a.ensure_open(a.end_time + Duration::seconds(1)), Err(EngineError::PromotionEnded(_))));
        assert!(matches!(a.ensure_open(a.start_time - Duration::seconds(1)), Err(EngineError::PromotionNotStarted(_))));
    }
}
