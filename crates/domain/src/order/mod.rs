//! Order model, status state machine and persistence.

pub mod memory;
mod model;
pub mod postgres;
mod status;
mod store;

pub use model::{DraftLine, Money, Order, OrderDraft, OrderItem};
pub use status::OrderItemStatus;
pub use store::{OrderStore, StatusUpdate};
