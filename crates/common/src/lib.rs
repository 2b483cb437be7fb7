//! Shared identifier types used across the order platform crates.

pub mod types;

pub use types::{CartId, OrderId, OrderItemId, ProductId, ShopId, UserId, VariationId};
