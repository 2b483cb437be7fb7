//! Reactive workers behind the order flow.
//!
//! Once the saga commits an order, everything downstream happens here:
//! stock is decremented, the ordered cart lines are cleared, shops get
//! their denormalized order feed, approval is tracked per order, and
//! depleted variations are announced to analytics. All of it runs on
//! bus deliveries with at-least-once semantics, so every worker is
//! written to converge under redelivery.

pub mod approval;
pub mod cart_clearer;
pub mod dedup;
pub mod low_stock;
pub mod shop_mirror;
pub mod stock_reducer;

pub use approval::ApprovalWatcher;
pub use cart_clearer::CartClearer;
pub use dedup::ProcessedRegistry;
pub use low_stock::LowStockScanner;
pub use shop_mirror::{ShopOrderDetail, ShopOrderItem, ShopOrderMirror};
pub use stock_reducer::StockReducer;
