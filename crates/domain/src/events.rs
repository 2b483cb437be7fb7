//! Integration events carried on the platform bus.
//!
//! Every event is a plain serde struct plus a routing key. The
//! [`IntegrationEvent`] trait wraps a typed event into the opaque
//! [`Message`] envelope the bus transports; consumers decode the payload
//! back with [`event_bus::Delivery::payload_as`].

use chrono::{DateTime, Utc};
use common::{CartId, OrderId, OrderItemId, ProductId, ShopId, UserId, VariationId};
use event_bus::{BusError, Message, RoutingKey};
use serde::{Deserialize, Serialize};

use crate::order::{Money, Order, OrderItem, OrderItemStatus};
use crate::stock::LowStockAlert;

/// Exchange names used across the platform.
pub mod exchanges {
    /// Order lifecycle events.
    pub const ORDERS: &str = "orders";

    /// Events feeding the analytics pipeline.
    pub const ANALYTICS: &str = "analytics";
}

/// Routing keys for events this service publishes or binds on.
pub mod routing_keys {
    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_ITEM_CREATED: &str = "order.item.created";
    pub const ORDER_ITEM_STATUS_UPDATED: &str = "order.item.status.updated";
    pub const ORDER_APPROVED: &str = "analytics.order.approved";
    pub const LOW_STOCK: &str = "analytics.low_stock";

    // Published by other platform services. Listed so bindings against
    // the shared exchanges can be written from one place.
    pub const PRODUCT_CREATED: &str = "product.created";
    pub const PRODUCT_UPDATED: &str = "product.updated";
    pub const PRODUCT_DELETED: &str = "product.deleted";
    pub const SHOP_APPROVED: &str = "shop.approved";
    pub const SHOP_UPDATED: &str = "shop.updated";
    pub const SHOP_DELETED: &str = "shop.deleted";
    pub const USER_CREATED: &str = "user.created";
}

/// A typed event that knows the routing key it travels under.
pub trait IntegrationEvent: Serialize {
    /// Routing key the event is published with.
    fn routing_key(&self) -> &'static str;

    /// Wraps the event in a bus message envelope.
    fn to_message(&self) -> Result<Message, BusError>
    where
        Self: Sized,
    {
        let key = RoutingKey::parse(self.routing_key())?;
        Ok(Message::builder().routing_key(key).payload(self)?.build())
    }
}

/// One ordered line inside an [`OrderCreatedEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedItem {
    pub product_variation_id: VariationId,
    pub quantity: u32,
}

/// Published once per committed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: OrderId,
    pub user_uuid: UserId,
    pub cart_id: CartId,
    pub items: Vec<OrderCreatedItem>,
}

impl OrderCreatedEvent {
    /// Builds the event from a committed order.
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.order_id,
            user_uuid: order.user_id,
            cart_id: order.cart_id,
            items: order
                .items
                .iter()
                .map(|item| OrderCreatedItem {
                    product_variation_id: item.variation_id,
                    quantity: item.quantity,
                })
                .collect(),
        }
    }
}

impl IntegrationEvent for OrderCreatedEvent {
    fn routing_key(&self) -> &'static str {
        routing_keys::ORDER_CREATED
    }
}

/// Published once per item of a committed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemCreatedEvent {
    pub order_item_id: OrderItemId,
    pub order_id: OrderId,
    pub shop_id: ShopId,
    pub product_id: ProductId,
    pub product_variation: VariationId,
    pub quantity: u32,
    pub price: Money,
    pub status: OrderItemStatus,
    pub user_id: UserId,
}

impl OrderItemCreatedEvent {
    /// Builds the event for one item of a committed order.
    pub fn from_item(order: &Order, item: &OrderItem) -> Self {
        Self {
            order_item_id: item.order_item_id,
            order_id: item.order_id,
            shop_id: item.shop_id,
            product_id: item.product_id,
            product_variation: item.variation_id,
            quantity: item.quantity,
            price: item.unit_price,
            status: item.status,
            user_id: order.user_id,
        }
    }
}

impl IntegrationEvent for OrderItemCreatedEvent {
    fn routing_key(&self) -> &'static str {
        routing_keys::ORDER_ITEM_CREATED
    }
}

/// Published whenever a shop moves an item to a new status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemStatusUpdatedEvent {
    pub order_item_id: OrderItemId,
    pub order_id: OrderId,
    pub shop_id: ShopId,
    pub status: OrderItemStatus,
}

impl OrderItemStatusUpdatedEvent {
    /// Builds the event from the item's post-update state.
    pub fn from_item(item: &OrderItem) -> Self {
        Self {
            order_item_id: item.order_item_id,
            order_id: item.order_id,
            shop_id: item.shop_id,
            status: item.status,
        }
    }
}

impl IntegrationEvent for OrderItemStatusUpdatedEvent {
    fn routing_key(&self) -> &'static str {
        routing_keys::ORDER_ITEM_STATUS_UPDATED
    }
}

/// One item inside an [`OrderApprovedEvent`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderApprovedItem {
    pub order_item_id: OrderItemId,
    pub product_variation_id: VariationId,
    pub quantity: u32,
    pub price: Money,
    pub status: OrderItemStatus,
}

/// Published exactly once when every item of an order reaches a
/// terminal status. Carries the full order snapshot for analytics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderApprovedEvent {
    pub order_id: OrderId,
    pub user_uuid: UserId,
    pub approved_at: DateTime<Utc>,
    pub items: Vec<OrderApprovedItem>,
}

impl OrderApprovedEvent {
    /// Builds the event from the approved order's current state.
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.order_id,
            user_uuid: order.user_id,
            approved_at: Utc::now(),
            items: order
                .items
                .iter()
                .map(|item| OrderApprovedItem {
                    order_item_id: item.order_item_id,
                    product_variation_id: item.variation_id,
                    quantity: item.quantity,
                    price: item.unit_price,
                    status: item.status,
                })
                .collect(),
        }
    }
}

impl IntegrationEvent for OrderApprovedEvent {
    fn routing_key(&self) -> &'static str {
        routing_keys::ORDER_APPROVED
    }
}

/// Published when an active variation sits at or below its low-stock
/// threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockEvent {
    pub product_variation_id: VariationId,
    pub product_id: ProductId,
    pub shop_id: ShopId,
    pub amount: u32,
    pub amount_limit: u32,
}

impl From<LowStockAlert> for LowStockEvent {
    fn from(alert: LowStockAlert) -> Self {
        Self {
            product_variation_id: alert.variation_id,
            product_id: alert.product_id,
            shop_id: alert.shop_id,
            amount: alert.amount,
            amount_limit: alert.amount_limit,
        }
    }
}

impl IntegrationEvent for LowStockEvent {
    fn routing_key(&self) -> &'static str {
        routing_keys::LOW_STOCK
    }
}
