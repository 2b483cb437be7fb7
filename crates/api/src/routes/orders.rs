//! Checkout and order read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::OrderId;
use consumers::ShopOrderMirror;
use domain::{CartService, Order, OrderItem, OrderStore, StockLedger};
use event_bus::Publisher;
use saga::OrderSagaCoordinator;
use serde::Serialize;

use super::{parse_uuid, user_identity};
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<C, L, O>
where
    C: CartService,
    L: StockLedger,
    O: OrderStore,
{
    pub saga: OrderSagaCoordinator<C, L, O>,
    pub cart: C,
    pub stock: L,
    pub orders: O,
    pub shop_mirror: ShopOrderMirror,
    pub publisher: Publisher,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub user_id: String,
    pub cart_id: String,
    pub created_at: String,
    pub approved: bool,
    pub total: i64,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub order_item_id: String,
    pub product_variation_id: String,
    pub product_id: String,
    pub shop_id: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub status: String,
}

impl OrderResponse {
    /// Maps a persisted order into its wire shape.
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.order_id.to_string(),
            user_id: order.user_id.to_string(),
            cart_id: order.cart_id.to_string(),
            created_at: order.created_at.to_rfc3339(),
            approved: order.approved,
            total: order.total().cents(),
            items: order.items.iter().map(OrderItemResponse::from_item).collect(),
        }
    }
}

impl OrderItemResponse {
    /// Maps a persisted order item into its wire shape.
    pub fn from_item(item: &OrderItem) -> Self {
        Self {
            order_item_id: item.order_item_id.to_string(),
            product_variation_id: item.variation_id.to_string(),
            product_id: item.product_id.to_string(),
            shop_id: item.shop_id.to_string(),
            quantity: item.quantity,
            unit_price: item.unit_price.cents(),
            status: item.status.to_string(),
        }
    }
}

// -- Handlers --

/// POST /orders — turn the calling user's cart into an order.
#[tracing::instrument(skip(state, headers))]
pub async fn create<C, L, O>(
    State(state): State<Arc<AppState<C, L, O>>>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    C: CartService + Clone + 'static,
    L: StockLedger + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let user_id = user_identity(&headers)?;
    let order = state.saga.create_order_from_cart(user_id).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from_order(&order))))
}

/// GET /orders/{id} — load one order with its items.
#[tracing::instrument(skip(state))]
pub async fn get<C, L, O>(
    State(state): State<Arc<AppState<C, L, O>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    C: CartService + Clone + 'static,
    L: StockLedger + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let order_id = OrderId::from_uuid(parse_uuid(&id)?);
    let order = state
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(OrderResponse::from_order(&order)))
}

/// GET /orders — the calling user's orders, newest first.
#[tracing::instrument(skip(state, headers))]
pub async fn list<C, L, O>(
    State(state): State<Arc<AppState<C, L, O>>>,
    headers: HeaderMap,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    C: CartService + Clone + 'static,
    L: StockLedger + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let user_id = user_identity(&headers)?;
    let orders = state.orders.orders_for_user(user_id).await?;

    Ok(Json(orders.iter().map(OrderResponse::from_order).collect()))
}
