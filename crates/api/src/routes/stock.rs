//! Stock ledger upsert endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{ProductId, ShopId, VariationId};
use domain::{CartService, Money, OrderStore, StockLedger, StockUnit};
use serde::{Deserialize, Serialize};

use super::orders::AppState;
use super::parse_uuid;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct StockUpsertRequest {
    pub product_id: String,
    pub shop_id: String,
    pub amount: u32,
    pub amount_limit: u32,
    pub is_active: bool,
    pub unit_price: i64,
}

#[derive(Serialize)]
pub struct StockUnitResponse {
    pub variation_id: String,
    pub product_id: String,
    pub shop_id: String,
    pub amount: u32,
    pub amount_limit: u32,
    pub is_active: bool,
    pub unit_price: i64,
}

impl StockUnitResponse {
    fn from_unit(unit: StockUnit) -> Self {
        Self {
            variation_id: unit.variation_id.to_string(),
            product_id: unit.product_id.to_string(),
            shop_id: unit.shop_id.to_string(),
            amount: unit.amount,
            amount_limit: unit.amount_limit,
            is_active: unit.is_active,
            unit_price: unit.unit_price.cents(),
        }
    }
}

/// PUT /stock/{variation_id} — create or replace a variation's stock
/// record.
#[tracing::instrument(skip(state, req))]
pub async fn upsert<C, L, O>(
    State(state): State<Arc<AppState<C, L, O>>>,
    Path(variation_id): Path<String>,
    Json(req): Json<StockUpsertRequest>,
) -> Result<Json<StockUnitResponse>, ApiError>
where
    C: CartService + Clone + 'static,
    L: StockLedger + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let unit = StockUnit {
        variation_id: VariationId::from_uuid(parse_uuid(&variation_id)?),
        product_id: ProductId::from_uuid(parse_uuid(&req.product_id)?),
        shop_id: ShopId::from_uuid(parse_uuid(&req.shop_id)?),
        amount: req.amount,
        amount_limit: req.amount_limit,
        is_active: req.is_active,
        unit_price: Money::from_cents(req.unit_price),
    };
    state.stock.upsert_unit(unit).await?;

    Ok(Json(StockUnitResponse::from_unit(unit)))
}
