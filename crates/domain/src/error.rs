//! Domain error types.

use common::{OrderId, OrderItemId};
use thiserror::Error;

use crate::order::OrderItemStatus;

/// Errors that can occur when working with order state.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order item does not exist.
    #[error("Order item not found: {0}")]
    OrderItemNotFound(OrderItemId),

    /// The requested status move is not allowed by the state machine.
    #[error("Invalid status transition for item {order_item_id}: {from} -> {to}")]
    InvalidStatusTransition {
        order_item_id: OrderItemId,
        from: OrderItemStatus,
        to: OrderItemStatus,
    },

    /// An order draft must carry at least one line.
    #[error("Order has no items")]
    NoItems,

    /// A stored status value could not be parsed.
    #[error("Invalid status value: {0}")]
    InvalidStatus(String),

    /// The backing store is unreachable.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, DomainError>;
