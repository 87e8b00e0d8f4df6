//! Engine facade: wires the components over one store and exposes the
//! request/response contracts used by the transport layer.

use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::{EngineConfig, MAX_GROUP_TTL_HOURS};
use crate::domain::aggregates::{Coupon, FlashSale, GroupBuyingActivity, InventoryLevels, Order, OrderStatus, Product, User};
use crate::notify::NotificationSink;
use crate::services::{
    CommissionCascader, CouponEngine, CreateOrder, FlashSaleController, GroupBuyingCoordinator, InventoryLedger, JoinResult,
    OrderStateMachine, PaymentReceipt, TransitionContext,
};
use crate::store::Store;
use crate::Result;

#[derive(Clone, Debug, Default, Serialize)]
pub struct SweepReport {
    pub ended_sales: Vec<Uuid>,
    pub expired_groups: Vec<Uuid>,
}

#[derive(Clone)]
pub struct CommerceEngine {
    store: Arc<Store>,
    pub inventory: InventoryLedger,
    pub coupons: CouponEngine,
    pub commissions: CommissionCascader,
    pub orders: OrderStateMachine,
    pub flash_sales: FlashSaleController,
    pub group_buys: GroupBuyingCoordinator,
}

impl CommerceEngine {
    pub fn new(config: &EngineConfig, sink: Arc<dyn NotificationSink>, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(Store::new());
        let inventory = InventoryLedger::new(store.clone(), sink.clone());
        let coupons = CouponEngine::new(store.clone(), clock.clone());
        let commissions = CommissionCascader::new(store.clone(), sink.clone(), config.commission_rates.clone());
        let orders = OrderStateMachine::new(
            store.clone(), inventory.clone(), coupons.clone(), commissions.clone(),
            sink.clone(), clock.clone(), config.points_rate_percent, config.order_number_prefix.clone(),
        );
        let flash_sales = FlashSaleController::new(store.clone(), orders.clone(), sink.clone(), clock.clone());
        let group_buys = GroupBuyingCoordinator::new(store.clone(), orders.clone(), sink, clock, Duration::hours(config.group_ttl_hours.clamp(1, MAX_GROUP_TTL_HOURS)));
        Self { store, inventory, coupons, commissions, orders, flash_sales, group_buys }
    }

    pub fn store(&self) -> &Arc<Store> { &self.store }

    // ---- catalog and promotion setup ----

    pub fn add_product(&self, product: Product) -> Product {
        info!(product_id = %product.id, name = %product.name, stock = product.inventory.total, "product added");
        self.store.products.insert(product.id, product.clone());
        product
    }

    pub fn register_user(&self, user: User) -> User {
        self.store.users.insert(user.id, user.clone());
        user
    }

    pub fn add_coupon(&self, coupon: Coupon) -> Result<Coupon> {
        self.store.insert_coupon(coupon.clone())?;
        Ok(coupon)
    }

    pub fn create_flash_sale(&self, sale: FlashSale) -> Result<FlashSale> { self.flash_sales.register(sale) }

    pub fn create_group_activity(&self, activity: GroupBuyingActivity) -> Result<GroupBuyingActivity> { self.group_buys.register(activity) }

    pub async fn cancel_flash_sale(&self, sale_id: Uuid) -> Result<FlashSale> { self.flash_sales.cancel(sale_id).await }

    pub async fn restock(&self, product_id: Uuid, quantity: u32) -> Result<InventoryLevels> { self.inventory.restock(product_id, quantity).await }

    // ---- request contracts ----

    pub async fn create_order(&self, req: CreateOrder) -> Result<Order> { self.orders.create(req).await }

    pub async fn transition_order(&self, order_id: Uuid, target: OrderStatus, ctx: TransitionContext) -> Result<Order> {
        self.orders.transition(order_id, target, ctx).await
    }

    pub async fn pay_order(&self, order_id: Uuid, payment_method: &str) -> Result<PaymentReceipt> {
        self.orders.pay(order_id, payment_method).await
    }

    pub async fn purchase_flash_sale(&self, sale_id: Uuid, user_id: Uuid, quantity: u32) -> Result<Order> {
        self.flash_sales.purchase(sale_id, user_id, quantity).await
    }

    pub async fn join_group_buy(&self, activity_id: Uuid, user_id: Uuid, group_id: Option<Uuid>, quantity: u32) -> Result<JoinResult> {
        self.group_buys.join(activity_id, group_id, user_id, quantity).await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order> { self.orders.get(order_id).await }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User> { self.store.users.snapshot(&user_id).await }

    pub async fn get_product(&self, product_id: Uuid) -> Result<Product> { self.store.products.snapshot(&product_id).await }

    /// Applies time-driven promotion transitions that nobody has touched yet.
    pub async fn sweep_expired(&self) -> SweepReport {
        SweepReport {
            ended_sales: self.flash_sales.refresh_all().await,
            expired_groups: self.group_buys.expire_due_groups().await,
        }
    }
}
