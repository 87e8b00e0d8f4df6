//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use crate::domain::value_objects::Money;
use crate::{EngineError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_no: String,
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    pub amount: AmountSummary,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub coupon_code: Option<String>,
    pub source: OrderSource,
    pub fulfillment: Fulfillment,
    pub timeline: Vec<TimelineEntry>,
    /// Set once the referral cascade for this order has been paid out.
    pub commission_distributed: bool,
    pub points_earned: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem { pub product_id: Uuid, pub name: String, pub quantity: u32, pub unit_price: Money, pub total: Money }

impl LineItem {
    pub fn new(product_id: Uuid, name: impl Into<String>, quantity: u32, unit_price: Money) -> Self {
        Self { product_id, name: name.into(), quantity, unit_price, total: unit_price.multiply(quantity) }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountSummary { pub subtotal: Money, pub discount: Money, pub total: Money }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address { pub name: String, pub street1: String, pub street2: Option<String>, pub city: String, pub state: Option<String>, pub zip: String, pub country: String }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Fulfillment {
    Delivery { address: Address },
    /// In-store pickup, released against the order's verification code.
    Pickup,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderSource {
    Direct,
    FlashSale { sale_id: Uuid },
    GroupBuy { activity_id: Uuid, group_id: Uuid },
}

impl OrderSource {
    /// Only direct orders hold stock in the inventory ledger; promotions keep their own pools.
    pub fn holds_inventory(&self) -> bool { matches!(self, Self::Direct) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Paid, Shipped, Delivered, Cancelled, Refunded }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { #[default] Unpaid, Paid, Refunded }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry { pub status: OrderStatus, pub at: DateTime<Utc>, pub description: String }

impl OrderStatus {
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, target),
            (Pending, Paid) | (Pending, Cancelled) | (Paid, Shipped) | (Paid, Refunded) | (Shipped, Delivered) | (Shipped, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending", Self::Paid => "paid", Self::Shipped => "shipped",
            Self::Delivered => "delivered", Self::Cancelled => "cancelled", Self::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// Inputs for a new order; amounts are derived from the items.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub order_no: String,
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    pub discount: Money,
    pub coupon_code: Option<String>,
    pub source: OrderSource,
    pub fulfillment: Fulfillment,
}

impl Order {
    pub fn create(new: NewOrder, now: DateTime<Utc>) -> Result<Self> {
        if new.items.is_empty() { return Err(EngineError::Validation("order has no items".into())); }
        merge_quantities(new.items.iter().map(|i| (i.product_id, i.quantity)))?;
        let subtotal: Money = new.items.iter().map(|i| i.total).sum();
        let total = subtotal.checked_sub(new.discount).ok_or_else(|| {
            EngineError::invariant(format!("discount {} exceeds subtotal {}", new.discount, subtotal))
        })?;
        Ok(Self {
            id: Uuid::now_v7(), order_no: new.order_no, user_id: new.user_id, items: new.items,
            amount: AmountSummary { subtotal, discount: new.discount, total },
            status: OrderStatus::Pending, payment_status: PaymentStatus::Unpaid, payment_method: None,
            coupon_code: new.coupon_code, source: new.source, fulfillment: new.fulfillment,
            timeline: vec![TimelineEntry { status: OrderStatus::Pending, at: now, description: "Order created".into() }],
            commission_distributed: false, points_earned: 0, created_at: now, updated_at: now, paid_at: None,
        })
    }

    /// Rejects `target` unless the lifecycle table allows it from the current status.
    pub fn ensure_transition(&self, target: OrderStatus) -> Result<()> {
        if self.status.can_transition_to(target) { return Ok(()); }
        Err(EngineError::InvalidTransition { order_id: self.id.to_string(), from: self.status.to_string(), to: target.to_string() })
    }

    pub fn transition(&mut self, target: OrderStatus, description: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_transition(target)?;
        self.status = target;
        match target {
            OrderStatus::Paid => { self.payment_status = PaymentStatus::Paid; self.paid_at = Some(now); }
            OrderStatus::Refunded => self.payment_status = PaymentStatus::Refunded,
            _ => {}
        }
        self.timeline.push(TimelineEntry { status: target, at: now, description: description.into() });
        self.updated_at = now;
        Ok(())
    }

    pub fn is_pickup(&self) -> bool { matches!(self.fulfillment, Fulfillment::Pickup) }

    /// Six-digit pickup code derived from the random half of the order id.
    pub fn verification_code(&self) -> String {
        let bytes = self.id.as_bytes();
        let mut tail = [0u8; 8];
        tail.copy_from_slice(&bytes[8..]);
        format!("{:06}", u64::from_be_bytes(tail) % 1_000_000)
    }

    /// (product, quantity) pairs, merged per product.
    pub fn quantities(&self) -> Result<Vec<(Uuid, u32)>> {
        merge_quantities(self.items.iter().map(|i| (i.product_id, i.quantity)))
    }
}

/// Sums quantities per product in ascending id order. Fails if a product's total overflows.
pub fn merge_quantities(lines: impl IntoIterator<Item = (Uuid, u32)>) -> Result<Vec<(Uuid, u32)>> {
    let mut merged: std::collections::BTreeMap<Uuid, u32> = Default::default();
    for (product_id, qty) in lines {
        let slot = merged.entry(product_id).or_default();
        *slot = slot.checked_add(qty)
            .ok_or_else(|| EngineError::Validation(format!("quantity for product {} is out of range", product_id)))?;
    }
    Ok(merged.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(discount: i64) -> Order {
        let p = Uuid::now_v7();
        Order::create(NewOrder {
            order_no: "ORD-1".into(), user_id: Uuid::now_v7(),
            items: vec![LineItem::new(p, "Widget", 2, Money::from_major(10)), LineItem::new(p, "Widget", 1, Money::from_major(10))],
            discount: Money::from_major(discount), coupon_code: None, source: OrderSource::Direct, fulfillment: Fulfillment::Pickup,
        }, Utc::now()).unwrap()
    }

    #[test]
    fn test_amounts_add_up() {
        let o = order(5);
        assert_eq!(o.amount.subtotal, Money::from_major(30));
        assert_eq!(o.amount.total, Money::from_major(25));
        assert_eq!(o.quantities().unwrap(), vec![(o.items[0].product_id, 3)]);
    }

    #[test]
    fn test_repeated_lines_past_u32_are_rejected() {
        let p = Uuid::now_v7();
        let res = Order::create(NewOrder {
            order_no: "ORD-3".into(), user_id: Uuid::now_v7(),
            items: vec![LineItem::new(p, "Widget", u32::MAX, Money::from_major(1)), LineItem::new(p, "Widget", 2, Money::from_major(1))],
            discount: Money::ZERO, coupon_code: None, source: OrderSource::Direct, fulfillment: Fulfillment::Pickup,
        }, Utc::now());
        assert!(matches!(res, Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_order_workflow() {
        let mut o = order(0);
        o.transition(OrderStatus::Paid, "paid", Utc::now()).unwrap();
        assert_eq!(o.payment_status, PaymentStatus::Paid);
        o.transition(OrderStatus::Shipped, "shipped", Utc::now()).unwrap();
        o.transition(OrderStatus::Delivered, "delivered", Utc::now()).unwrap();
        assert_eq!(o.timeline.len(), 4);
        assert!(o.status.is_terminal());
    }

    #[test]
    fn test_delivered_is_terminal() {
        let mut o = order(0);
        o.status = OrderStatus::Delivered;
        for target in [OrderStatus::Pending, OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Delivered, OrderStatus::Cancelled, OrderStatus::Refunded] {
            assert!(matches!(o.transition(target, "x", Utc::now()), Err(EngineError::InvalidTransition { .. })));
        }
        assert_eq!(o.timeline.len(), 1);
    }

    #[test]
    fn test_verification_code_is_stable() {
        let o = order(0);
        assert_eq!(o.verification_code(), o.verification_code());
        assert_eq!(o.verification_code().len(), 6);
    }

    #[test]
    fn test_discount_above_subtotal_is_invariant_breach() {
        let res = Order::create(NewOrder {
            order_no: "ORD-2".into(), user_id: Uuid::now_v7(),
            items: vec![LineItem::new(Uuid::now_v7(), "Widget", 1, Money::from_major(10))],
            discount: Money::from_major(11), coupon_code: None, source: OrderSource::Direct, fulfillment: Fulfillment::Pickup,
        }, Utc::now());
        assert!(matches!(res, Err(EngineError::InvariantViolated(_))));
    }
}
