//! Order item status state machine.

use serde::{Deserialize, Serialize};

/// Fulfillment status of a single order item.
///
/// Status moves forward only:
/// ```text
/// Processing ──► Shipped ──► Delivered
///     │             │
///     └─────────────┴──► Cancelled
/// ```
/// Skipping ahead is allowed (a shop may report `Delivered` straight
/// from `Processing` when scans were missed). `Delivered` and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderItemStatus {
    /// The shop is preparing the item.
    #[default]
    Processing,

    /// The item has been handed to the carrier.
    Shipped,

    /// The item reached the buyer (terminal state).
    Delivered,

    /// The item will not be fulfilled (terminal state).
    Cancelled,
}

impl OrderItemStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderItemStatus::Delivered | OrderItemStatus::Cancelled)
    }

    /// Whether a move from `self` to `next` is allowed.
    ///
    /// Re-applying the current status is allowed so that redelivered
    /// updates stay harmless; callers treat it as a no-op.
    pub fn can_transition_to(&self, next: OrderItemStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match next {
            OrderItemStatus::Cancelled => true,
            _ => next.fulfillment_rank() > self.fulfillment_rank(),
        }
    }

    fn fulfillment_rank(&self) -> u8 {
        match self {
            OrderItemStatus::Processing => 0,
            OrderItemStatus::Shipped => 1,
            OrderItemStatus::Delivered => 2,
            OrderItemStatus::Cancelled => 3,
        }
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderItemStatus::Processing => "Processing",
            OrderItemStatus::Shipped => "Shipped",
            OrderItemStatus::Delivered => "Delivered",
            OrderItemStatus::Cancelled => "Cancelled",
        }
    }

    /// Parses a status name produced by [`as_str`](Self::as_str).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Processing" => Some(OrderItemStatus::Processing),
            "Shipped" => Some(OrderItemStatus::Shipped),
            "Delivered" => Some(OrderItemStatus::Delivered),
            "Cancelled" => Some(OrderItemStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
