//! Tracks order approval from item status updates.

use async_trait::async_trait;
use domain::{
    IntegrationEvent, OrderApprovedEvent, OrderItemStatusUpdatedEvent, OrderStore, exchanges,
    routing_keys,
};
use event_bus::{BindingPattern, Delivery, HandlerError, MessageHandler, Publisher, QueueBinding};

/// Consumes `order.item.status.updated` and derives order approval.
///
/// An order is approved once every item sits in a terminal status. The
/// check recomputes from current store state, so replays in any order
/// re-derive the same boolean; the store's one-way `set_approved` edge
/// guards the single analytics announcement.
pub struct ApprovalWatcher<O: OrderStore> {
    orders: O,
    publisher: Publisher,
}

impl<O: OrderStore> ApprovalWatcher<O> {
    /// Creates a watcher over the given store and analytics publisher.
    pub fn new(orders: O, publisher: Publisher) -> Self {
        Self { orders, publisher }
    }

    /// The queue binding this consumer is subscribed with.
    pub fn binding() -> event_bus::Result<QueueBinding> {
        Ok(QueueBinding::new(
            exchanges::ORDERS,
            "approval-watcher",
            BindingPattern::parse(routing_keys::ORDER_ITEM_STATUS_UPDATED)?,
        ))
    }
}

#[async_trait]
impl<O: OrderStore> MessageHandler for ApprovalWatcher<O> {
    fn name(&self) -> &'static str {
        "approval-watcher"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let event: OrderItemStatusUpdatedEvent =
            delivery.payload_as().map_err(HandlerError::fatal)?;

        let order = self
            .orders
            .get_order(event.order_id)
            .await
            .map_err(HandlerError::retryable)?;
        let Some(order) = order else {
            // Orders are committed before their events are published, so
            // an unknown id is stale data; drop it rather than loop.
            tracing::warn!(order_id = %event.order_id, "status update for unknown order");
            return Ok(());
        };

        if order.approved || !order.all_items_terminal() {
            return Ok(());
        }

        let changed = self
            .orders
            .set_approved(order.order_id)
            .await
            .map_err(HandlerError::retryable)?;
        if !changed {
            // A replay or a concurrent worker already claimed the edge.
            return Ok(());
        }

        metrics::counter!("orders_approved").increment(1);
        tracing::info!(
            order_id = %order.order_id,
            items = order.items.len(),
            "order approved, all items terminal"
        );

        // The approval flag is durable; losing the announcement is
        // preferable to announcing twice.
        let announcement = OrderApprovedEvent::from_order(&order);
        match announcement.to_message() {
            Ok(message) => {
                if let Err(err) = self.publisher.publish(exchanges::ANALYTICS, message).await {
                    tracing::warn!(
                        order_id = %order.order_id,
                        error = %err,
                        "approval announcement failed"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(
                    order_id = %order.order_id,
                    error = %err,
                    "approval announcement encode failed"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use common::{CartId, OrderItemId, ProductId, ShopId, UserId, VariationId};
    use domain::{
        DraftLine, InMemoryOrderStore, Money, Order, OrderDraft, OrderItemStatus,
        OrderItemStatusUpdatedEvent,
    };
    use event_bus::{InMemoryEventBus, RetryPolicy};

    use super::*;

    fn quick_publisher(bus: &InMemoryEventBus) -> Publisher {
        Publisher::with_policy(
            Arc::new(bus.clone()),
            RetryPolicy {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                multiplier: 2.0,
            },
        )
    }

    async fn seeded_order(store: &InMemoryOrderStore, items: usize) -> Order {
        let lines = (0..items)
            .map(|_| DraftLine {
                variation_id: VariationId::new(),
                product_id: ProductId::new(),
                shop_id: ShopId::new(),
                quantity: 1,
                unit_price: Money::from_cents(500),
            })
            .collect();
        store
            .insert_order(OrderDraft {
                user_id: UserId::new(),
                cart_id: CartId::new(),
                lines,
            })
            .await
            .unwrap()
    }

    fn update_delivery(order: &Order, index: usize, status: OrderItemStatus) -> Delivery {
        let event = OrderItemStatusUpdatedEvent {
            order_item_id: order.items[index].order_item_id,
            order_id: order.order_id,
            shop_id: order.items[index].shop_id,
            status,
        };
        Delivery {
            message: event.to_message().unwrap(),
            redelivery_count: 0,
        }
    }

    async fn approved_announcements(bus: &InMemoryEventBus) -> usize {
        bus.published_with_key(exchanges::ANALYTICS, routing_keys::ORDER_APPROVED)
            .await
            .len()
    }

    #[tokio::test]
    async fn approves_only_once_every_item_is_terminal() {
        let store = InMemoryOrderStore::new();
        let bus = InMemoryEventBus::new();
        let watcher = ApprovalWatcher::new(store.clone(), quick_publisher(&bus));
        let order = seeded_order(&store, 2).await;

        store
            .update_item_status(order.items[0].order_item_id, OrderItemStatus::Delivered)
            .await
            .unwrap();
        watcher
            .handle(&update_delivery(&order, 0, OrderItemStatus::Delivered))
            .await
            .unwrap();
        assert!(!store.get_order(order.order_id).await.unwrap().unwrap().approved);
        assert_eq!(approved_announcements(&bus).await, 0);

        store
            .update_item_status(order.items[1].order_item_id, OrderItemStatus::Cancelled)
            .await
            .unwrap();
        watcher
            .handle(&update_delivery(&order, 1, OrderItemStatus::Cancelled))
            .await
            .unwrap();
        assert!(store.get_order(order.order_id).await.unwrap().unwrap().approved);

        let announcements = bus
            .published_with_key(exchanges::ANALYTICS, routing_keys::ORDER_APPROVED)
            .await;
        assert_eq!(announcements.len(), 1);
        assert_eq!(
            announcements[0].payload["items"].as_array().map(Vec::len),
            Some(2)
        );
    }

    #[tokio::test]
    async fn replays_announce_nothing_further() {
        let store = InMemoryOrderStore::new();
        let bus = InMemoryEventBus::new();
        let watcher = ApprovalWatcher::new(store.clone(), quick_publisher(&bus));
        let order = seeded_order(&store, 1).await;

        store
            .update_item_status(order.items[0].order_item_id, OrderItemStatus::Delivered)
            .await
            .unwrap();
        let delivery = update_delivery(&order, 0, OrderItemStatus::Delivered);

        watcher.handle(&delivery).await.unwrap();
        watcher.handle(&delivery).await.unwrap();
        watcher.handle(&delivery).await.unwrap();

        assert!(store.get_order(order.order_id).await.unwrap().unwrap().approved);
        assert_eq!(approved_announcements(&bus).await, 1);
    }

    #[tokio::test]
    async fn unknown_order_is_dropped() {
        let store = InMemoryOrderStore::new();
        let bus = InMemoryEventBus::new();
        let watcher = ApprovalWatcher::new(store.clone(), quick_publisher(&bus));

        let event = OrderItemStatusUpdatedEvent {
            order_item_id: OrderItemId::new(),
            order_id: common::OrderId::new(),
            shop_id: ShopId::new(),
            status: OrderItemStatus::Delivered,
        };
        let delivery = Delivery {
            message: event.to_message().unwrap(),
            redelivery_count: 0,
        };

        watcher.handle(&delivery).await.unwrap();
        assert_eq!(approved_announcements(&bus).await, 0);
    }

    #[tokio::test]
    async fn failed_announcement_does_not_fail_the_message() {
        let store = InMemoryOrderStore::new();
        let bus = InMemoryEventBus::new();
        let watcher = ApprovalWatcher::new(store.clone(), quick_publisher(&bus));
        let order = seeded_order(&store, 1).await;

        store
            .update_item_status(order.items[0].order_item_id, OrderItemStatus::Delivered)
            .await
            .unwrap();
        bus.set_fail_publish(true);

        watcher
            .handle(&update_delivery(&order, 0, OrderItemStatus::Delivered))
            .await
            .unwrap();

        // The flag is set even though the announcement was lost.
        assert!(store.get_order(order.order_id).await.unwrap().unwrap().approved);
        assert_eq!(approved_announcements(&bus).await, 0);
    }
}
