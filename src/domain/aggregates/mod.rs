//! Aggregates module
pub mod coupon;
pub mod flash_sale;
pub mod group_buy;
pub mod order;
pub mod product;
pub mod user;

pub use coupon::{Coupon, CouponStatus, DiscountKind};
pub use flash_sale::{FlashSale, FlashSaleStatus};
pub use group_buy::{GroupBuyingActivity, GroupBuyingGroup, GroupStatus, JoinOutcome, Participant};
pub use order::{merge_quantities, Address, AmountSummary, Fulfillment, LineItem, NewOrder, Order, OrderSource, OrderStatus, PaymentStatus, TimelineEntry};
pub use product::{InventoryLevels, Product, ProductStatus};
pub use user::{Role, User, UserProfile};
