//! Referral commission cascade, run once per paid order.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MAX_REFERRAL_DEPTH;
use crate::domain::aggregates::Order;
use crate::domain::events::{CommissionEvent, DomainEvent};
use crate::domain::value_objects::Money;
use crate::notify::NotificationSink;
use crate::store::Store;
use crate::{EngineError, Result};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommissionPayout {
    pub referrer_id: Uuid,
    pub level: u8,
    pub amount: Money,
}

#[derive(Clone)]
pub struct CommissionCascader {
    store: Arc<Store>,
    sink: Arc<dyn NotificationSink>,
    rates: Vec<Decimal>,
}

impl CommissionCascader {
    pub fn new(store: Arc<Store>, sink: Arc<dyn NotificationSink>, mut rates: Vec<Decimal>) -> Self {
        rates.truncate(MAX_REFERRAL_DEPTH);
        Self { store, sink, rates }
    }

    /// Pays the referral chain above the buyer. The caller holds the order lock;
    /// the `commission_distributed` marker makes repeat calls no-ops.
    pub async fn distribute(&self, order: &mut Order) -> Result<Vec<CommissionPayout>> {
        if order.commission_distributed {
            debug!(order_id = %order.id, "commission already distributed");
            return Ok(vec![]);
        }
        let mut payouts = Vec::new();
        let mut visited = HashSet::from([order.user_id]);
        let mut next = self.referrer_of(order.user_id).await?;

        for (idx, rate) in self.rates.iter().enumerate() {
            let Some(referrer_id) = next else { break };
            if !visited.insert(referrer_id) {
                debug!(order_id = %order.id, referrer_id = %referrer_id, "referral cycle, stopping");
                break;
            }
            let mut referrer = match self.store.users.lock(&referrer_id).await {
                Ok(user) => user,
                Err(EngineError::NotFound { .. }) => break,
                Err(e) => return Err(e),
            };
            let level = idx as u8 + 1;
            let amount = order.amount.total.percent(*rate);
            if !amount.is_zero() {
                referrer.credit_wallet(amount)?;
                info!(order_id = %order.id, referrer_id = %referrer_id, level, amount = %amount, "commission credited");
                self.sink.publish(DomainEvent::Commission(CommissionEvent::Credited { order_id: order.id, referrer_id, level, amount }));
                payouts.push(CommissionPayout { referrer_id, level, amount });
            }
            next = referrer.profile.referrer_id;
        }

        order.commission_distributed = true;
        Ok(payouts)
    }

    async fn referrer_of(&self, user_id: Uuid) -> Result<Option<Uuid>> {
        match self.store.users.lock(&user_id).await {
            Ok(user) => Ok(user.profile.referrer_id),
            Err(EngineError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
