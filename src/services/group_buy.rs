//! Group buying: recruitment, exactly-once completion and order fan-out.

use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::aggregates::{GroupBuyingActivity, GroupBuyingGroup, GroupStatus, OrderSource};
use crate::domain::events::{DomainEvent, PromotionEvent};
use crate::notify::NotificationSink;
use crate::services::orders::{OrderStateMachine, PromotionalOrder};
use crate::store::Store;
use crate::{EngineError, Result};

#[derive(Clone, Debug, Serialize)]
pub struct JoinResult {
    pub group: GroupBuyingGroup,
    pub activity: GroupBuyingActivity,
}

#[derive(Clone)]
pub struct GroupBuyingCoordinator {
    store: Arc<Store>,
    orders: OrderStateMachine,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    group_ttl: Duration,
}

impl GroupBuyingCoordinator {
    pub fn new(store: Arc<Store>, orders: OrderStateMachine, sink: Arc<dyn NotificationSink>, clock: Arc<dyn Clock>, group_ttl: Duration) -> Self {
        Self { store, orders, sink, clock, group_ttl }
    }

    pub fn register(&self, activity: GroupBuyingActivity) -> Result<GroupBuyingActivity> {
        if !self.store.products.contains(&activity.product_id) {
            return Err(EngineError::not_found("product", activity.product_id));
        }
        info!(activity_id = %activity.id, group_size = activity.group_size, "group buying activity registered");
        self.store.activities.insert(activity.id, activity.clone());
        Ok(activity)
    }

    pub async fn group(&self, group_id: Uuid) -> Result<GroupBuyingGroup> {
        let mut group = self.store.groups.lock(&group_id).await?;
        if group.expire_if_due(self.clock.now()) { self.publish_expired(&group); }
        Ok(group.clone())
    }

    /// Opens a new group when `group_id` is absent, otherwise joins the given one.
    pub async fn join(&self, activity_id: Uuid, group_id: Option<Uuid>, user_id: Uuid, qty: u32) -> Result<JoinResult> {
        if qty == 0 { return Err(EngineError::Validation("quantity must be positive".into())); }
        if !self.store.users.contains(&user_id) { return Err(EngineError::not_found("user", user_id)); }
        match group_id {
            None => self.open_group(activity_id, user_id, qty).await,
            Some(group_id) => self.join_group(activity_id, group_id, user_id, qty).await,
        }
    }

    async fn open_group(&self, activity_id: Uuid, leader_id: Uuid, qty: u32) -> Result<JoinResult> {
        let now = self.clock.now();
        let mut activity = self.store.activities.lock(&activity_id).await?;
        activity.ensure_open(now)?;
        activity.open_group()?;
        activity.record_participant();
        let group = GroupBuyingGroup::open(&activity, leader_id, qty, now, self.group_ttl);
        self.store.groups.insert(group.id, group.clone());
        info!(group_id = %group.id, activity_id = %activity_id, leader_id = %leader_id, "group opened");
        self.sink.publish(DomainEvent::Promotion(PromotionEvent::GroupCreated { group_id: group.id, activity_id, leader_id }));
        Ok(JoinResult { group, activity: activity.clone() })
    }

    async fn join_group(&self, activity_id: Uuid, group_id: Uuid, user_id: Uuid, qty: u32) -> Result<JoinResult> {
        let now = self.clock.now();
        let (group, activity, completed) = {
            let mut group = self.store.groups.lock(&group_id).await?;
            if group.activity_id != activity_id {
                return Err(EngineError::not_found("group", group_id));
            }
            let mut activity = self.store.activities.lock(&activity_id).await?;
            activity.ensure_open(now)?;
            let was_recruiting = group.status == GroupStatus::Recruiting;
            let outcome = match group.join(user_id, qty, now) {
                Ok(outcome) => outcome,
                Err(err) => {
                    if was_recruiting && group.status == GroupStatus::Expired { self.publish_expired(&group); }
                    warn!(group_id = %group_id, user_id = %user_id, error = %err, "group join rejected");
                    return Err(err);
                }
            };
            activity.record_participant();
            debug!(group_id = %group_id, user_id = %user_id, size = group.current_size, required = group.required_size, "joined group");
            (group.clone(), activity.clone(), outcome.completed)
        };

        if !completed {
            return Ok(JoinResult { group, activity });
        }
        let group = self.complete(group, &activity).await?;
        Ok(JoinResult { group, activity })
    }

    /// Runs once per group: only the joiner that filled the last seat gets here.
    async fn complete(&self, mut group: GroupBuyingGroup, activity: &GroupBuyingActivity) -> Result<GroupBuyingGroup> {
        let mut order_ids = Vec::with_capacity(group.participants.len());
        for participant in &group.participants {
            let promo = PromotionalOrder {
                user_id: participant.user_id, product_id: activity.product_id, quantity: participant.quantity,
                unit_price: activity.group_price, source: OrderSource::GroupBuy { activity_id: activity.id, group_id: group.id },
            };
            match self.orders.create_promotional(promo).await {
                Ok(order) => order_ids.push(order.id),
                Err(err) => error!(group_id = %group.id, user_id = %participant.user_id, error = %err, "group order fan-out failed"),
            }
        }
        self.store.groups.lock(&group.id).await?.order_ids = order_ids.clone();
        group.order_ids = order_ids.clone();
        info!(group_id = %group.id, activity_id = %activity.id, orders = order_ids.len(), "group completed");
        self.sink.publish(DomainEvent::Promotion(PromotionEvent::GroupCompleted {
            group_id: group.id, activity_id: activity.id,
            participants: group.participants.iter().map(|p| p.user_id).collect(), order_ids,
        }));
        Ok(group)
    }

    /// Expires recruiting groups past their deadline. Returns the expired ids.
    pub async fn expire_due_groups(&self) -> Vec<Uuid> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for id in self.store.groups.keys() {
            let Ok(mut group) = self.store.groups.lock(&id).await else { continue };
            if group.expire_if_due(now) {
                self.publish_expired(&group);
                expired.push(id);
            }
        }
        if !expired.is_empty() { info!(count = expired.len(), "expired stale groups"); }
        expired
    }

    fn publish_expired(&self, group: &GroupBuyingGroup) {
        debug!(group_id = %group.id, "group expired");
        self.sink.publish(DomainEvent::Promotion(PromotionEvent::GroupExpired { group_id: group.id, activity_id: group.activity_id }));
    }
}
