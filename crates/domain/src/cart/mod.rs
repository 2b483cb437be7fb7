//! Cart snapshots and the versioned cart contract.
//!
//! Carts live in their own service boundary. The order flow only ever sees
//! an immutable [`CartSnapshot`] tagged with a [`CartVersion`], and every
//! mutation is a compare-and-set against the version the caller read. A
//! stale version means the user edited the cart concurrently and the
//! caller must re-read before acting.

pub mod memory;

use async_trait::async_trait;
use common::{CartId, UserId, VariationId};
use serde::{Deserialize, Serialize};

/// Monotonic cart version used for optimistic concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartVersion(i64);

impl CartVersion {
    /// Creates a version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The version assigned to a freshly created cart.
    pub fn initial() -> Self {
        Self(1)
    }

    /// The version that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Gets the raw version value.
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for CartVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single line in a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub variation_id: VariationId,
    pub quantity: u32,
}

/// Immutable point-in-time view of a user's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub cart_id: CartId,
    pub user_id: UserId,
    pub version: CartVersion,
    pub lines: Vec<CartLine>,
}

impl CartSnapshot {
    /// Looks up the line for a variation, if present.
    pub fn line(&self, variation_id: VariationId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.variation_id == variation_id)
    }

    /// True when the cart holds no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Errors from cart operations.
#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("cart {0} not found")]
    NotFound(CartId),

    #[error("cart {cart_id} has no line for variation {variation_id}")]
    LineNotFound {
        cart_id: CartId,
        variation_id: VariationId,
    },

    #[error("cart {cart_id} version conflict: expected {expected}, actual {actual}")]
    VersionConflict {
        cart_id: CartId,
        expected: CartVersion,
        actual: CartVersion,
    },

    #[error("cart service unavailable: {0}")]
    Unavailable(String),
}

/// Result type for cart operations.
pub type CartResult<T> = std::result::Result<T, CartError>;

/// Contract for the cart collaborator.
///
/// Mutations that take an `expected` version are compare-and-set: they
/// apply only when the stored version still matches, bump the version by
/// one, and return the new version. [`CartService::clear_line`] is the
/// exception; it runs after an order is placed and must stay idempotent,
/// so it skips the version check.
#[async_trait]
pub trait CartService: Send + Sync {
    /// Returns the current cart for a user, or `None` when the user has
    /// no cart yet.
    async fn snapshot_for_user(&self, user_id: UserId) -> CartResult<Option<CartSnapshot>>;

    /// Adds a line or replaces its quantity, creating the cart on first
    /// use. A quantity of zero removes the line instead.
    async fn upsert_line(
        &self,
        user_id: UserId,
        variation_id: VariationId,
        quantity: u32,
    ) -> CartResult<CartSnapshot>;

    /// Sets the quantity of an existing line if the version still
    /// matches. A quantity of zero removes the line instead.
    async fn update_line_quantity(
        &self,
        cart_id: CartId,
        variation_id: VariationId,
        quantity: u32,
        expected: CartVersion,
    ) -> CartResult<CartVersion>;

    /// Removes an existing line if the version still matches.
    async fn remove_line(
        &self,
        cart_id: CartId,
        variation_id: VariationId,
        expected: CartVersion,
    ) -> CartResult<CartVersion>;

    /// Bumps the version if `expected` still matches, returning the new
    /// version.
    ///
    /// This is the checkout fence: of any number of callers holding the
    /// same snapshot version, exactly one claim succeeds and the rest
    /// observe a [`CartError::VersionConflict`].
    async fn claim_version(&self, cart_id: CartId, expected: CartVersion)
    -> CartResult<CartVersion>;

    /// Removes a line without a version check. Returns `true` when a line
    /// was removed and `false` when the cart or line was already gone.
    async fn clear_line(&self, cart_id: CartId, variation_id: VariationId) -> CartResult<bool>;
}
