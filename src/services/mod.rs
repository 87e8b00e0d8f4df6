//! Engine components
pub mod commission;
pub mod coupons;
pub mod flash_sale;
pub mod group_buy;
pub mod inventory;
pub mod orders;

pub use commission::{CommissionCascader, CommissionPayout};
pub use coupons::{CouponEngine, Redemption};
pub use flash_sale::FlashSaleController;
pub use group_buy::{GroupBuyingCoordinator, JoinResult};
pub use inventory::InventoryLedger;
pub use orders::{CreateOrder, OrderLine, OrderStateMachine, PaymentReceipt, TransitionContext};
