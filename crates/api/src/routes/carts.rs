//! Cart staging endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use common::VariationId;
use domain::{CartService, CartSnapshot, OrderStore, StockLedger};
use serde::{Deserialize, Serialize};

use super::orders::AppState;
use super::{parse_uuid, user_identity};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct UpsertLineRequest {
    pub variation_id: String,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub cart_id: String,
    pub user_id: String,
    pub version: i64,
    pub lines: Vec<CartLineResponse>,
}

#[derive(Serialize)]
pub struct CartLineResponse {
    pub variation_id: String,
    pub quantity: u32,
}

impl CartResponse {
    fn from_snapshot(snapshot: &CartSnapshot) -> Self {
        Self {
            cart_id: snapshot.cart_id.to_string(),
            user_id: snapshot.user_id.to_string(),
            version: snapshot.version.as_i64(),
            lines: snapshot
                .lines
                .iter()
                .map(|line| CartLineResponse {
                    variation_id: line.variation_id.to_string(),
                    quantity: line.quantity,
                })
                .collect(),
        }
    }
}

/// PUT /carts/lines — add a line to the calling user's cart or replace
/// its quantity. Quantity zero removes the line. Creates the cart on
/// first use.
#[tracing::instrument(skip(state, headers, req))]
pub async fn upsert_line<C, L, O>(
    State(state): State<Arc<AppState<C, L, O>>>,
    headers: HeaderMap,
    Json(req): Json<UpsertLineRequest>,
) -> Result<Json<CartResponse>, ApiError>
where
    C: CartService + Clone + 'static,
    L: StockLedger + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let user_id = user_identity(&headers)?;
    let variation_id = VariationId::from_uuid(parse_uuid(&req.variation_id)?);

    let snapshot = state
        .cart
        .upsert_line(user_id, variation_id, req.quantity)
        .await?;

    Ok(Json(CartResponse::from_snapshot(&snapshot)))
}
