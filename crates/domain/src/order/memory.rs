//! In-memory order store for testing.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, OrderItemId, UserId};

use crate::order::{Order, OrderDraft, OrderItem, OrderItemStatus, OrderStore, StatusUpdate};
use crate::{DomainError, Result};

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<OrderId, Order>,
    item_index: HashMap<OrderItemId, OrderId>,
    fail_on_insert: bool,
}

/// In-memory order store implementation for testing.
///
/// Provides the same interface and invariants as the PostgreSQL
/// implementation, including atomic insert semantics.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail on insert calls.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.state.write().unwrap().fail_on_insert = fail;
    }

    /// Returns the number of persisted orders.
    pub fn order_count(&self) -> usize {
        self.state.read().unwrap().orders.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, draft: OrderDraft) -> Result<Order> {
        if draft.lines.is_empty() {
            return Err(DomainError::NoItems);
        }

        let mut state = self.state.write().unwrap();
        if state.fail_on_insert {
            return Err(DomainError::Unavailable(
                "simulated storage outage".to_string(),
            ));
        }

        let order_id = OrderId::new();
        let items: Vec<OrderItem> = draft
            .lines
            .into_iter()
            .map(|line| OrderItem {
                order_item_id: OrderItemId::new(),
                order_id,
                variation_id: line.variation_id,
                product_id: line.product_id,
                shop_id: line.shop_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                status: OrderItemStatus::Processing,
            })
            .collect();

        let order = Order {
            order_id,
            user_id: draft.user_id,
            cart_id: draft.cart_id,
            created_at: Utc::now(),
            approved: false,
            items,
        };

        for item in &order.items {
            state.item_index.insert(item.order_item_id, order_id);
        }
        state.orders.insert(order_id, order.clone());
        metrics::counter!("orders_persisted").increment(1);

        Ok(order)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().unwrap().orders.get(&order_id).cloned())
    }

    async fn get_order_for_item(&self, order_item_id: OrderItemId) -> Result<Option<Order>> {
        let state = self.state.read().unwrap();
        let order = state
            .item_index
            .get(&order_item_id)
            .and_then(|order_id| state.orders.get(order_id))
            .cloned();
        Ok(order)
    }

    async fn update_item_status(
        &self,
        order_item_id: OrderItemId,
        status: OrderItemStatus,
    ) -> Result<StatusUpdate> {
        let mut state = self.state.write().unwrap();
        let order_id = *state
            .item_index
            .get(&order_item_id)
            .ok_or(DomainError::OrderItemNotFound(order_item_id))?;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(DomainError::OrderNotFound(order_id))?;
        let item = order
            .items
            .iter_mut()
            .find(|item| item.order_item_id == order_item_id)
            .ok_or(DomainError::OrderItemNotFound(order_item_id))?;

        if item.status == status {
            return Ok(StatusUpdate {
                order: order.clone(),
                changed: false,
            });
        }
        if !item.status.can_transition_to(status) {
            return Err(DomainError::InvalidStatusTransition {
                order_item_id,
                from: item.status,
                to: status,
            });
        }

        item.status = status;
        Ok(StatusUpdate {
            order: order.clone(),
            changed: true,
        })
    }

    async fn set_approved(&self, order_id: OrderId) -> Result<bool> {
        let mut state = self.state.write().unwrap();
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(DomainError::OrderNotFound(order_id))?;
        if order.approved {
            return Ok(false);
        }
        order.approved = true;
        Ok(true)
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().unwrap();
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use common::{CartId, ProductId, ShopId, VariationId};

    use super::*;
    use crate::order::{DraftLine, Money};

    fn draft(user_id: UserId, quantities: &[u32]) -> OrderDraft {
        OrderDraft {
            user_id,
            cart_id: CartId::new(),
            lines: quantities
                .iter()
                .map(|&quantity| DraftLine {
                    variation_id: VariationId::new(),
                    product_id: ProductId::new(),
                    shop_id: ShopId::new(),
                    quantity,
                    unit_price: Money::from_cents(1000),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_preserves_line_order() {
        let store = InMemoryOrderStore::new();
        let user_id = UserId::new();

        let order = store.insert_order(draft(user_id, &[2, 1, 5])).await.unwrap();

        assert_eq!(order.items.len(), 3);
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.items[1].quantity, 1);
        assert_eq!(order.items[2].quantity, 5);
        assert!(order
            .items
            .iter()
            .all(|item| item.status == OrderItemStatus::Processing));
        assert!(!order.approved);
    }

    #[tokio::test]
    async fn empty_draft_is_rejected() {
        let store = InMemoryOrderStore::new();
        let result = store.insert_order(draft(UserId::new(), &[])).await;
        assert!(matches!(result, Err(DomainError::NoItems)));
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn get_order_for_item_resolves_the_parent() {
        let store = InMemoryOrderStore::new();
        let order = store
            .insert_order(draft(UserId::new(), &[1]))
            .await
            .unwrap();
        let item_id = order.items[0].order_item_id;

        let found = store.get_order_for_item(item_id).await.unwrap().unwrap();
        assert_eq!(found.order_id, order.order_id);

        assert!(store
            .get_order_for_item(OrderItemId::new())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn status_update_moves_forward_and_reports_change() {
        let store = InMemoryOrderStore::new();
        let order = store
            .insert_order(draft(UserId::new(), &[1]))
            .await
            .unwrap();
        let item_id = order.items[0].order_item_id;

        let update = store
            .update_item_status(item_id, OrderItemStatus::Shipped)
            .await
            .unwrap();
        assert!(update.changed);
        assert_eq!(update.order.items[0].status, OrderItemStatus::Shipped);

        // Same status again: no-op.
        let update = store
            .update_item_status(item_id, OrderItemStatus::Shipped)
            .await
            .unwrap();
        assert!(!update.changed);
    }

    #[tokio::test]
    async fn backward_status_update_is_rejected() {
        let store = InMemoryOrderStore::new();
        let order = store
            .insert_order(draft(UserId::new(), &[1]))
            .await
            .unwrap();
        let item_id = order.items[0].order_item_id;

        store
            .update_item_status(item_id, OrderItemStatus::Delivered)
            .await
            .unwrap();
        let result = store
            .update_item_status(item_id, OrderItemStatus::Shipped)
            .await;
        assert!(matches!(
            result,
            Err(DomainError::InvalidStatusTransition { .. })
        ));
    }

    #[tokio::test]
    async fn set_approved_is_one_way() {
        let store = InMemoryOrderStore::new();
        let order = store
            .insert_order(draft(UserId::new(), &[1]))
            .await
            .unwrap();

        assert!(store.set_approved(order.order_id).await.unwrap());
        assert!(!store.set_approved(order.order_id).await.unwrap());
        assert!(store
            .get_order(order.order_id)
            .await
            .unwrap()
            .unwrap()
            .approved);
    }

    #[tokio::test]
    async fn orders_for_user_filters_and_sorts() {
        let store = InMemoryOrderStore::new();
        let user_id = UserId::new();

        store.insert_order(draft(user_id, &[1])).await.unwrap();
        store.insert_order(draft(user_id, &[2])).await.unwrap();
        store
            .insert_order(draft(UserId::new(), &[3]))
            .await
            .unwrap();

        let orders = store.orders_for_user(user_id).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert!(orders[0].created_at >= orders[1].created_at);
    }

    #[tokio::test]
    async fn simulated_outage_fails_insert() {
        let store = InMemoryOrderStore::new();
        store.set_fail_on_insert(true);

        let result = store.insert_order(draft(UserId::new(), &[1])).await;
        assert!(matches!(result, Err(DomainError::Unavailable(_))));

        store.set_fail_on_insert(false);
        assert!(store.insert_order(draft(UserId::new(), &[1])).await.is_ok());
    }
}
