//! Shop-side order item status updates.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use common::OrderItemId;
use domain::{
    CartService, IntegrationEvent, OrderItem, OrderItemStatus, OrderItemStatusUpdatedEvent,
    OrderStore, StockLedger, exchanges,
};
use serde::Deserialize;

use super::orders::{AppState, OrderItemResponse};
use super::{parse_uuid, shop_identity};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

/// POST /order-items/{id}/status — move an item to a new status.
///
/// Only the shop the item belongs to may move it. The status event is
/// published only when the stored status actually changed, so a
/// retried request does not multiply downstream work.
#[tracing::instrument(skip(state, headers, req))]
pub async fn update_status<C, L, O>(
    State(state): State<Arc<AppState<C, L, O>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<OrderItemResponse>, ApiError>
where
    C: CartService + Clone + 'static,
    L: StockLedger + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let shop_id = shop_identity(&headers)?;
    let order_item_id = OrderItemId::from_uuid(parse_uuid(&id)?);
    let status = OrderItemStatus::parse(&req.status)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown status: {}", req.status)))?;

    let order = state
        .orders
        .get_order_for_item(order_item_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order item {id} not found")))?;
    let item = order
        .item(order_item_id)
        .ok_or_else(|| ApiError::NotFound(format!("Order item {id} not found")))?;
    if item.shop_id != shop_id {
        return Err(ApiError::Forbidden(
            "order item belongs to a different shop".to_string(),
        ));
    }

    let update = state
        .orders
        .update_item_status(order_item_id, status)
        .await?;
    let item = update
        .order
        .item(order_item_id)
        .ok_or_else(|| ApiError::Internal("updated item missing from its order".to_string()))?;

    metrics::counter!("api_status_updates").increment(1);

    if update.changed {
        announce_status(&state, item).await;
    }

    Ok(Json(OrderItemResponse::from_item(item)))
}

/// The status is already committed, so losing the announcement beats
/// failing the request; the shop can re-post to converge consumers.
async fn announce_status<C, L, O>(state: &AppState<C, L, O>, item: &OrderItem)
where
    C: CartService,
    L: StockLedger,
    O: OrderStore,
{
    let event = OrderItemStatusUpdatedEvent::from_item(item);
    match event.to_message() {
        Ok(message) => {
            if let Err(err) = state.publisher.publish(exchanges::ORDERS, message).await {
                tracing::warn!(
                    order_item_id = %item.order_item_id,
                    error = %err,
                    "status event publish failed after commit"
                );
            }
        }
        Err(err) => {
            tracing::warn!(
                order_item_id = %item.order_item_id,
                error = %err,
                "status event encode failed after commit"
            );
        }
    }
}
