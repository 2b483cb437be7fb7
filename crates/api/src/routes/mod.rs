//! HTTP route handlers.
//!
//! Identity arrives as gateway-issued headers: `x-user-id` on buyer
//! routes, `x-shop-id` on shop routes. The handlers trust those headers
//! (authentication lives in front of this service) and only parse them.

pub mod carts;
pub mod health;
pub mod metrics;
pub mod order_items;
pub mod orders;
pub mod shops;
pub mod stock;

use axum::http::HeaderMap;
use common::{ShopId, UserId};

use crate::error::ApiError;

/// Header carrying the authenticated buyer's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the authenticated shop's id.
pub const SHOP_ID_HEADER: &str = "x-shop-id";

/// Extracts the calling user from the `x-user-id` header.
fn user_identity(headers: &HeaderMap) -> Result<UserId, ApiError> {
    parse_id_header(headers, USER_ID_HEADER).map(UserId::from_uuid)
}

/// Extracts the calling shop from the `x-shop-id` header.
fn shop_identity(headers: &HeaderMap) -> Result<ShopId, ApiError> {
    parse_id_header(headers, SHOP_ID_HEADER).map(ShopId::from_uuid)
}

fn parse_id_header(headers: &HeaderMap, name: &str) -> Result<uuid::Uuid, ApiError> {
    let value = headers
        .get(name)
        .ok_or_else(|| ApiError::BadRequest(format!("Missing {name} header")))?
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {name} header")))?;
    uuid::Uuid::parse_str(value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid {name} header: {e}")))
}

fn parse_uuid(id: &str) -> Result<uuid::Uuid, ApiError> {
    uuid::Uuid::parse_str(id).map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
