//! Flash sale admission control.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::aggregates::{FlashSale, FlashSaleStatus, Order, OrderSource};
use crate::domain::events::{DomainEvent, PromotionEvent};
use crate::notify::NotificationSink;
use crate::services::orders::{OrderStateMachine, PromotionalOrder};
use crate::store::Store;
use crate::{EngineError, Result};

#[derive(Clone)]
pub struct FlashSaleController {
    store: Arc<Store>,
    orders: OrderStateMachine,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl FlashSaleController {
    pub fn new(store: Arc<Store>, orders: OrderStateMachine, sink: Arc<dyn NotificationSink>, clock: Arc<dyn Clock>) -> Self {
        Self { store, orders, sink, clock }
    }

    pub fn register(&self, sale: FlashSale) -> Result<FlashSale> {
        if !self.store.products.contains(&sale.product_id) {
            return Err(EngineError::not_found("product", sale.product_id));
        }
        info!(sale_id = %sale.id, product_id = %sale.product_id, inventory = sale.inventory, "flash sale scheduled");
        self.store.flash_sales.insert(sale.id, sale.clone());
        Ok(sale)
    }

    /// Current view of a sale with its status refreshed against the clock.
    pub async fn get(&self, sale_id: Uuid) -> Result<FlashSale> {
        let mut sale = self.store.flash_sales.lock(&sale_id).await?;
        sale.refresh_status(self.clock.now());
        Ok(sale.clone())
    }

    pub async fn purchase(&self, sale_id: Uuid, user_id: Uuid, qty: u32) -> Result<Order> {
        if qty == 0 { return Err(EngineError::Validation("quantity must be positive".into())); }
        if !self.store.users.contains(&user_id) { return Err(EngineError::not_found("user", user_id)); }

        let (product_id, unit_price, sold_count, sold_out) = {
            let mut sale = self.store.flash_sales.lock(&sale_id).await?;
            if let Err(err) = sale.admit(user_id, qty, self.clock.now()) {
                warn!(sale_id = %sale_id, user_id = %user_id, qty, error = %err, "flash sale purchase rejected");
                return Err(err);
            }
            info!(sale_id = %sale_id, user_id = %user_id, qty, sold = sale.sold_count, "flash sale purchase admitted");
            (sale.product_id, sale.sale_price, sale.sold_count, sale.remaining() == 0)
        };

        // Events go out only once the order exists; a revoked admission emits nothing.
        let promo = PromotionalOrder { user_id, product_id, quantity: qty, unit_price, source: OrderSource::FlashSale { sale_id } };
        match self.orders.create_promotional(promo).await {
            Ok(order) => {
                self.sink.publish(DomainEvent::Promotion(PromotionEvent::FlashSalePurchased { sale_id, user_id, quantity: qty, sold_count }));
                if sold_out {
                    self.sink.publish(DomainEvent::Promotion(PromotionEvent::FlashSaleSoldOut { sale_id }));
                }
                Ok(order)
            }
            Err(err) => {
                warn!(sale_id = %sale_id, user_id = %user_id, error = %err, "order creation failed, revoking admission");
                self.store.flash_sales.lock(&sale_id).await?.revoke(user_id, qty)?;
                Err(err)
            }
        }
    }

    pub async fn cancel(&self, sale_id: Uuid) -> Result<FlashSale> {
        let mut sale = self.store.flash_sales.lock(&sale_id).await?;
        sale.refresh_status(self.clock.now());
        sale.cancel()?;
        info!(sale_id = %sale_id, sold = sale.sold_count, "flash sale cancelled");
        Ok(sale.clone())
    }

    /// Refreshes every sale's status; returns the ids that moved to ended.
    pub async fn refresh_all(&self) -> Vec<Uuid> {
        let now = self.clock.now();
        let mut ended = Vec::new();
        for id in self.store.flash_sales.keys() {
            let Ok(mut sale) = self.store.flash_sales.lock(&id).await else { continue };
            let before = sale.status;
            if sale.refresh_status(now) == FlashSaleStatus::Ended && before != FlashSaleStatus::Ended {
                ended.push(id);
            }
        }
        ended
    }
}
