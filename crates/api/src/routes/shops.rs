//! Shop order feed, served from the mirror view.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ShopId;
use consumers::ShopOrderItem;
use domain::{CartService, OrderStore, StockLedger};

use super::orders::AppState;
use super::parse_uuid;
use crate::error::ApiError;

/// GET /shops/{shop_id}/order-items — the shop's mirrored order items,
/// oldest first.
///
/// The mirror is fed asynchronously from bus events, so a row can lag
/// its order by a beat; rows never regress once applied.
#[tracing::instrument(skip(state))]
pub async fn order_items<C, L, O>(
    State(state): State<Arc<AppState<C, L, O>>>,
    Path(shop_id): Path<String>,
) -> Result<Json<Vec<ShopOrderItem>>, ApiError>
where
    C: CartService + Clone + 'static,
    L: StockLedger + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let shop_id = ShopId::from_uuid(parse_uuid(&shop_id)?);
    Ok(Json(state.shop_mirror.items_for_shop(shop_id)))
}
