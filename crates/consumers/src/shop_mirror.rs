//! Per-shop denormalized view of order items.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{OrderId, OrderItemId, ProductId, ShopId, UserId, VariationId};
use domain::{
    Money, OrderItemCreatedEvent, OrderItemStatus, OrderItemStatusUpdatedEvent, exchanges,
    routing_keys,
};
use event_bus::{BindingPattern, Delivery, HandlerError, MessageHandler, QueueBinding};
use serde::{Deserialize, Serialize};

/// One row of a shop's order feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopOrderItem {
    pub order_item_id: OrderItemId,
    pub order_id: OrderId,
    pub shop_id: ShopId,
    pub status: OrderItemStatus,

    /// Present once the `order.item.created` event has been applied.
    pub detail: Option<ShopOrderDetail>,
}

/// Fields only the creation event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopOrderDetail {
    pub product_id: ProductId,
    pub variation_id: VariationId,
    pub quantity: u32,
    pub unit_price: Money,
    pub user_id: UserId,
}

#[derive(Debug, Default)]
struct MirrorState {
    items: HashMap<OrderItemId, ShopOrderItem>,
    shop_index: HashMap<ShopId, Vec<OrderItemId>>,
}

/// Keeps a per-shop mirror of order items from bus events.
///
/// Rows are upserted by `order_item_id`, so redelivery converges, and
/// a status update racing ahead of its creation event starts a partial
/// row that the creation event later completes without regressing the
/// status.
#[derive(Debug, Clone, Default)]
pub struct ShopOrderMirror {
    state: Arc<RwLock<MirrorState>>,
}

impl ShopOrderMirror {
    /// Creates an empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// The queue binding this consumer is subscribed with.
    pub fn binding() -> event_bus::Result<QueueBinding> {
        Ok(QueueBinding::new(
            exchanges::ORDERS,
            "shop-mirror",
            BindingPattern::parse(routing_keys::ORDER_ITEM_CREATED)?,
        )
        .and_pattern(BindingPattern::parse(
            routing_keys::ORDER_ITEM_STATUS_UPDATED,
        )?))
    }

    /// Items mirrored for one shop, oldest first.
    pub fn items_for_shop(&self, shop_id: ShopId) -> Vec<ShopOrderItem> {
        let state = self.state.read().unwrap();
        state
            .shop_index
            .get(&shop_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.items.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Looks up a single mirrored item.
    pub fn get(&self, order_item_id: OrderItemId) -> Option<ShopOrderItem> {
        self.state.read().unwrap().items.get(&order_item_id).cloned()
    }

    /// Number of mirrored items across all shops.
    pub fn len(&self) -> usize {
        self.state.read().unwrap().items.len()
    }

    /// True when no item has been mirrored yet.
    pub fn is_empty(&self) -> bool {
        self.state.read().unwrap().items.is_empty()
    }

    fn apply_created(&self, event: OrderItemCreatedEvent) {
        let detail = ShopOrderDetail {
            product_id: event.product_id,
            variation_id: event.product_variation,
            quantity: event.quantity,
            unit_price: event.price,
            user_id: event.user_id,
        };

        let mut state = self.state.write().unwrap();
        if let Some(row) = state.items.get_mut(&event.order_item_id) {
            // A status update landed first; keep its status and only
            // fill in the detail.
            row.detail = Some(detail);
        } else {
            state
                .shop_index
                .entry(event.shop_id)
                .or_default()
                .push(event.order_item_id);
            state.items.insert(
                event.order_item_id,
                ShopOrderItem {
                    order_item_id: event.order_item_id,
                    order_id: event.order_id,
                    shop_id: event.shop_id,
                    status: event.status,
                    detail: Some(detail),
                },
            );
        }
        metrics::counter!("shop_mirror_upserts").increment(1);
    }

    fn apply_status(&self, event: OrderItemStatusUpdatedEvent) {
        let mut state = self.state.write().unwrap();
        if let Some(row) = state.items.get_mut(&event.order_item_id) {
            row.status = event.status;
        } else {
            // The update outran its creation event; start the row with
            // what the update carries.
            state
                .shop_index
                .entry(event.shop_id)
                .or_default()
                .push(event.order_item_id);
            state.items.insert(
                event.order_item_id,
                ShopOrderItem {
                    order_item_id: event.order_item_id,
                    order_id: event.order_id,
                    shop_id: event.shop_id,
                    status: event.status,
                    detail: None,
                },
            );
        }
        metrics::counter!("shop_mirror_upserts").increment(1);
    }
}

#[async_trait]
impl MessageHandler for ShopOrderMirror {
    fn name(&self) -> &'static str {
        "shop-mirror"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        match delivery.message.routing_key.as_str() {
            routing_keys::ORDER_ITEM_CREATED => {
                let event: OrderItemCreatedEvent =
                    delivery.payload_as().map_err(HandlerError::fatal)?;
                self.apply_created(event);
                Ok(())
            }
            routing_keys::ORDER_ITEM_STATUS_UPDATED => {
                let event: OrderItemStatusUpdatedEvent =
                    delivery.payload_as().map_err(HandlerError::fatal)?;
                self.apply_status(event);
                Ok(())
            }
            other => Err(HandlerError::Fatal(format!(
                "unexpected routing key {other}"
            ))),
        }
    }
}
