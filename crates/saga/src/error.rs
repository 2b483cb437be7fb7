//! Saga error types.

use common::VariationId;
use domain::{CartVersion, DomainError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a cart line was removed during stock validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// The variation no longer exists in the stock ledger.
    UnknownVariation,

    /// The product was deactivated by its shop.
    Inactive,

    /// Available amount is zero.
    OutOfStock,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RemovalReason::UnknownVariation => "unknown_variation",
            RemovalReason::Inactive => "inactive",
            RemovalReason::OutOfStock => "out_of_stock",
        };
        write!(f, "{s}")
    }
}

/// The fix that was applied to a cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CartFix {
    /// The line was removed from the cart.
    Removed { reason: RemovalReason },

    /// The line's quantity was lowered to what is in stock.
    QuantityReduced { from: u32, to: u32 },
}

/// One cart line the saga adjusted before refusing the order.
///
/// Serialized into the conflict response so the client can re-render
/// the corrected cart and let the buyer confirm it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartAdjustment {
    pub variation_id: VariationId,
    #[serde(flatten)]
    pub fix: CartFix,
}

/// Errors that can occur while driving the cart-to-order saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The user has no cart, or the cart holds no lines.
    #[error("cart is empty")]
    EmptyCart,

    /// Stock validation adjusted the cart; the caller must review the
    /// corrected contents and retry.
    #[error("cart was adjusted to match available stock ({} line(s) changed)", adjustments.len())]
    StockConflict { adjustments: Vec<CartAdjustment> },

    /// The cart was mutated concurrently between snapshot and commit.
    #[error("cart changed concurrently: expected version {expected}, found {actual}")]
    CartChanged {
        expected: CartVersion,
        actual: CartVersion,
    },

    /// A collaborator timed out or reported itself unreachable. Nothing
    /// was persisted; the caller may retry as-is.
    #[error("{dependency} unavailable: {reason}")]
    DependencyUnavailable {
        dependency: &'static str,
        reason: String,
    },

    /// The order commit failed after validation passed. The commit is
    /// atomic, so no partial order survives.
    #[error("order persistence failed: {0}")]
    Persistence(#[from] DomainError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
