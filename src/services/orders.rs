//! Order lifecycle and the side effects of each transition.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::aggregates::{merge_quantities, Address, Fulfillment, LineItem, NewOrder, Order, OrderSource, OrderStatus, PaymentStatus, User};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::Money;
use crate::notify::NotificationSink;
use crate::services::{CommissionCascader, CouponEngine, InventoryLedger};
use crate::store::{Guard, Store};
use crate::{EngineError, Result};

#[derive(Clone, Debug, Deserialize)]
pub struct OrderLine { pub product_id: Uuid, pub quantity: u32 }

#[derive(Clone, Debug, Deserialize)]
pub struct CreateOrder {
    pub user_id: Uuid,
    pub items: Vec<OrderLine>,
    pub coupon_code: Option<String>,
    pub delivery_address: Option<Address>,
}

/// Who is asking for a transition, plus transition-specific inputs.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TransitionContext {
    pub actor_id: Uuid,
    pub verification_code: Option<String>,
    pub payment_method: Option<String>,
    pub note: Option<String>,
}

impl TransitionContext {
    pub fn by(actor_id: Uuid) -> Self { Self { actor_id, ..Default::default() } }
    pub fn with_code(mut self, code: impl Into<String>) -> Self { self.verification_code = Some(code.into()); self }
}

#[derive(Clone, Debug, Serialize)]
pub struct PaymentReceipt {
    pub order: Order,
    pub points_earned: u64,
}

/// A single-line order created by a promotion.
pub(crate) struct PromotionalOrder {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: Money,
    pub source: OrderSource,
}

#[derive(Clone)]
pub struct OrderStateMachine {
    store: Arc<Store>,
    inventory: InventoryLedger,
    coupons: CouponEngine,
    commissions: CommissionCascader,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    points_rate: Decimal,
    number_prefix: String,
}

impl OrderStateMachine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>, inventory: InventoryLedger, coupons: CouponEngine, commissions: CommissionCascader,
        sink: Arc<dyn NotificationSink>, clock: Arc<dyn Clock>, points_rate: Decimal, number_prefix: impl Into<String>,
    ) -> Self {
        Self { store, inventory, coupons, commissions, sink, clock, points_rate, number_prefix: number_prefix.into() }
    }

    pub async fn get(&self, order_id: Uuid) -> Result<Order> { self.store.orders.snapshot(&order_id).await }

    /// Reserves stock for every line and redeems the coupon as one unit of work.
    pub async fn create(&self, req: CreateOrder) -> Result<Order> {
        if req.items.is_empty() { return Err(EngineError::Validation("order has no items".into())); }
        if req.items.iter().any(|l| l.quantity == 0) { return Err(EngineError::Validation("item quantity must be positive".into())); }
        let lines = merge_quantities(req.items.iter().map(|l| (l.product_id, l.quantity)))?;
        self.ensure_user(req.user_id).await?;

        let mut items = Vec::with_capacity(req.items.len());
        for line in &req.items {
            let product = self.store.products.snapshot(&line.product_id).await?;
            items.push(LineItem::new(product.id, product.name, line.quantity, product.price));
        }
        let subtotal: Money = items.iter().map(|i| i.total).sum();

        // Coupon lock is held across the reservation so usage can't race past max_usage.
        let redemption = match &req.coupon_code {
            Some(code) => Some(self.coupons.begin(code, subtotal).await?),
            None => None,
        };
        self.inventory.reserve_all(&lines).await?;

        let fulfillment = match req.delivery_address {
            Some(address) => Fulfillment::Delivery { address },
            None => Fulfillment::Pickup,
        };
        let new = NewOrder {
            order_no: self.next_order_no(), user_id: req.user_id, items,
            discount: redemption.as_ref().map_or(Money::ZERO, |r| r.discount()),
            coupon_code: redemption.as_ref().map(|r| r.code().to_string()),
            source: OrderSource::Direct, fulfillment,
        };
        let committed = Order::create(new, self.clock.now()).and_then(|order| match redemption {
            Some(r) => r.commit().map(|_| order),
            None => Ok(order),
        });
        let order = match committed {
            Ok(order) => order,
            Err(err) => {
                self.inventory.release_all(&lines).await?;
                return Err(err);
            }
        };
        Ok(self.publish_created(order))
    }

    /// Creates an order for stock already admitted by a promotion; the ledger is not touched.
    pub(crate) async fn create_promotional(&self, promo: PromotionalOrder) -> Result<Order> {
        let product = self.store.products.snapshot(&promo.product_id).await?;
        let new = NewOrder {
            order_no: self.next_order_no(), user_id: promo.user_id,
            items: vec![LineItem::new(product.id, product.name, promo.quantity, promo.unit_price)],
            discount: Money::ZERO, coupon_code: None, source: promo.source, fulfillment: Fulfillment::Pickup,
        };
        let order = Order::create(new, self.clock.now())?;
        Ok(self.publish_created(order))
    }

    /// Records an external payment confirmation. Replays of an already
    /// confirmed payment return the order unchanged with no points.
    pub async fn pay(&self, order_id: Uuid, payment_method: &str) -> Result<PaymentReceipt> {
        let mut order = self.store.orders.lock(&order_id).await?;
        if order.payment_status != PaymentStatus::Unpaid {
            info!(order_id = %order_id, status = %order.status, "payment already recorded, ignoring replay");
            return Ok(PaymentReceipt { order: order.clone(), points_earned: 0 });
        }
        order.ensure_transition(OrderStatus::Paid)?;
        let points_earned = self.settle_payment(&mut order, payment_method, "Payment confirmed").await?;
        Ok(PaymentReceipt { order: order.clone(), points_earned })
    }

    pub async fn transition(&self, order_id: Uuid, target: OrderStatus, ctx: TransitionContext) -> Result<Order> {
        let mut order = self.store.orders.lock(&order_id).await?;
        let actor = self.store.users.snapshot(&ctx.actor_id).await?;
        authorize(&order, target, &actor)?;
        order.ensure_transition(target)?;

        let now = self.clock.now();
        let note = |default: &str| ctx.note.clone().unwrap_or_else(|| default.to_string());
        match target {
            OrderStatus::Paid => {
                let method = ctx.payment_method.clone().unwrap_or_else(|| "external".to_string());
                self.settle_payment(&mut order, &method, &note("Payment confirmed")).await?;
            }
            OrderStatus::Cancelled => {
                if order.source.holds_inventory() { self.inventory.release_all(&order.quantities()?).await?; }
                order.transition(target, note("Order cancelled"), now)?;
                self.sink.publish(DomainEvent::Order(OrderEvent::Cancelled { order_id }));
            }
            OrderStatus::Refunded => {
                // Confirmed units left the reservation pool at payment; refunds put them back on the shelf.
                if order.source.holds_inventory() { self.inventory.restock_all(&order.quantities()?).await?; }
                order.transition(target, note("Order refunded"), now)?;
                self.sink.publish(DomainEvent::Order(OrderEvent::Refunded { order_id }));
            }
            OrderStatus::Shipped => {
                order.transition(target, note("Order shipped"), now)?;
                self.sink.publish(DomainEvent::Order(OrderEvent::Shipped { order_id }));
            }
            OrderStatus::Delivered => {
                if order.is_pickup() && ctx.verification_code.as_deref() != Some(order.verification_code().as_str()) {
                    return Err(EngineError::Unauthorized(format!("verification code mismatch for order {}", order_id)));
                }
                order.transition(target, note("Order delivered"), now)?;
                self.sink.publish(DomainEvent::Order(OrderEvent::Delivered { order_id }));
            }
            OrderStatus::Pending => return Err(EngineError::invariant(format!("order {} accepted pending as a target", order_id))),
        }
        info!(order_id = %order_id, status = %order.status, actor_id = %actor.id, "order transitioned");
        Ok(order.clone())
    }

    /// pending -> paid side effects, in lock order: products, then users.
    async fn settle_payment(&self, order: &mut Guard<Order>, method: &str, description: &str) -> Result<u64> {
        if order.source.holds_inventory() {
            self.inventory.confirm_all(&order.quantities()?).await?;
        }
        order.payment_method = Some(method.to_string());
        order.transition(OrderStatus::Paid, description, self.clock.now())?;
        self.commissions.distribute(order).await?;

        let points = order.amount.total.percent_floor(self.points_rate);
        match self.store.users.lock(&order.user_id).await {
            Ok(mut buyer) => buyer.credit_points(points)?,
            Err(EngineError::NotFound { .. }) => warn!(order_id = %order.id, user_id = %order.user_id, "buyer vanished, no points credited"),
            Err(e) => return Err(e),
        }
        order.points_earned = points;
        info!(order_id = %order.id, total = %order.amount.total, points, "order paid");
        self.sink.publish(DomainEvent::Order(OrderEvent::Paid { order_id: order.id, total: order.amount.total, points_earned: points }));
        Ok(points)
    }

    async fn ensure_user(&self, user_id: Uuid) -> Result<()> {
        if self.store.users.contains(&user_id) { Ok(()) } else { Err(EngineError::not_found("user", user_id)) }
    }

    fn next_order_no(&self) -> String {
        format!("{}-{}-{:06}", self.number_prefix, self.clock.now().format("%Y%m%d"), self.store.next_order_seq())
    }

    fn publish_created(&self, order: Order) -> Order {
        info!(order_id = %order.id, order_no = %order.order_no, user_id = %order.user_id, total = %order.amount.total, "order created");
        self.sink.publish(DomainEvent::Order(OrderEvent::Created {
            order_id: order.id, order_no: order.order_no.clone(), user_id: order.user_id, total: order.amount.total,
        }));
        self.store.orders.insert(order.id, order.clone());
        order
    }
}

fn authorize(order: &Order, target: OrderStatus, actor: &User) -> Result<()> {
    let owner = actor.id == order.user_id;
    let staff = actor.role.is_staff();
    let allowed = match target {
        // Pending is never reachable; parties to the order get the transition error for it.
        OrderStatus::Paid | OrderStatus::Cancelled | OrderStatus::Pending => owner || staff,
        OrderStatus::Delivered => staff || (owner && !order.is_pickup()),
        OrderStatus::Shipped | OrderStatus::Refunded => staff,
    };
    if allowed { return Ok(()); }
    Err(EngineError::Unauthorized(format!("user {} may not move order {} to {}", actor.id, order.id, target)))
}
