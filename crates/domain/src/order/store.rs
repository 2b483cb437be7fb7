//! Order persistence contract.

use async_trait::async_trait;
use common::{OrderId, OrderItemId, UserId};

use crate::Result;
use crate::order::{Order, OrderDraft, OrderItemStatus};

/// Outcome of a status update.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    /// The order after the update.
    pub order: Order,

    /// False when the item already carried the requested status, so
    /// nothing changed. Lets callers skip re-publishing on redelivery.
    pub changed: bool,
}

/// Core trait for order persistence.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists an order with its lines atomically.
    ///
    /// Either the order row and every item row are committed together
    /// or nothing is. The store assigns identifiers and the creation
    /// timestamp; items start in `Processing` and keep draft order.
    async fn insert_order(&self, draft: OrderDraft) -> Result<Order>;

    /// Fetches an order with its items, or None if it does not exist.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Fetches the order owning a given item, or None.
    async fn get_order_for_item(&self, order_item_id: OrderItemId) -> Result<Option<Order>>;

    /// Moves an item to a new status.
    ///
    /// Fails with `InvalidStatusTransition` when the state machine
    /// forbids the move. Re-applying the current status succeeds with
    /// `changed = false`.
    async fn update_item_status(
        &self,
        order_item_id: OrderItemId,
        status: OrderItemStatus,
    ) -> Result<StatusUpdate>;

    /// Marks an order approved. One-way: an approved order stays
    /// approved. Returns true when this call flipped the flag.
    async fn set_approved(&self, order_id: OrderId) -> Result<bool>;

    /// All orders placed by a user, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;
}
