//! Domain events
use crate::domain::value_objects::Money;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Inventory(InventoryEvent),
    Promotion(PromotionEvent),
    Commission(CommissionEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, order_no: String, user_id: Uuid, total: Money },
    Paid { order_id: Uuid, total: Money, points_earned: u64 },
    Shipped { order_id: Uuid },
    Delivered { order_id: Uuid },
    Cancelled { order_id: Uuid },
    Refunded { order_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryEvent {
    LowStock { product_id: Uuid, available: u32, threshold: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromotionEvent {
    FlashSalePurchased { sale_id: Uuid, user_id: Uuid, quantity: u32, sold_count: u32 },
    FlashSaleSoldOut { sale_id: Uuid },
    GroupCreated { group_id: Uuid, activity_id: Uuid, leader_id: Uuid },
    GroupCompleted { group_id: Uuid, activity_id: Uuid, participants: Vec<Uuid>, order_ids: Vec<Uuid> },
    GroupExpired { group_id: Uuid, activity_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommissionEvent {
    Credited { order_id: Uuid, referrer_id: Uuid, level: u8, amount: Money },
}

impl DomainEvent {
    /// Subject suffix used when the event leaves the process.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(e) => match e {
                OrderEvent::Created { .. } => "order.created",
                OrderEvent::Paid { .. } => "order.paid",
                OrderEvent::Shipped { .. } => "order.shipped",
                OrderEvent::Delivered { .. } => "order.delivered",
                OrderEvent::Cancelled { .. } => "order.cancelled",
                OrderEvent::Refunded { .. } => "order.refunded",
            },
            Self::Inventory(InventoryEvent::LowStock { .. }) => "inventory.low_stock",
            Self::Promotion(e) => match e {
                PromotionEvent::FlashSalePurchased { .. } => "flash_sale.purchased",
                PromotionEvent::FlashSaleSoldOut { .. } => "flash_sale.sold_out",
                PromotionEvent::GroupCreated { .. } => "group_buy.created",
                PromotionEvent::GroupCompleted { .. } => "group_buy.completed",
                PromotionEvent::GroupExpired { .. } => "group_buy.expired",
            },
            Self::Commission(CommissionEvent::Credited { .. }) => "commission.credited",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tags() {
        let event = DomainEvent::Order(OrderEvent::Shipped { order_id: Uuid::nil() });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["domain"], "order");
        assert_eq!(json["event"]["type"], "shipped");
        assert_eq!(event.subject(), "order.shipped");
    }
}
