//! Stock ledger for product variations.
//!
//! Each sellable variation carries an available `amount` and an
//! `amount_limit` threshold. Orders draw stock down through
//! [`StockLedger::decrement`] (strict, refuses to go negative) or
//! [`StockLedger::decrement_clamped`] (floors at zero and reports the
//! shortfall, for consumers that must make progress on redelivered
//! messages). A unit whose amount has fallen to its limit or below is
//! low on stock and shows up in [`StockLedger::scan_low_stock`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use common::{ProductId, ShopId, VariationId};
use serde::{Deserialize, Serialize};

use crate::order::Money;

/// Stock record for a single product variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUnit {
    pub variation_id: VariationId,
    pub product_id: ProductId,
    pub shop_id: ShopId,
    pub amount: u32,
    pub amount_limit: u32,
    pub is_active: bool,
    pub unit_price: Money,
}

impl StockUnit {
    /// True when the unit is at or below its low-stock threshold.
    pub fn is_low(&self) -> bool {
        self.amount <= self.amount_limit
    }
}

/// Outcome of a clamped decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decremented {
    /// Amount remaining after the decrement.
    pub new_amount: u32,
    /// Portion of the requested quantity that could not be covered.
    pub shortfall: u32,
}

impl Decremented {
    /// True when the full requested quantity was available.
    pub fn is_exact(&self) -> bool {
        self.shortfall == 0
    }
}

/// A variation that has crossed its low-stock threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub variation_id: VariationId,
    pub product_id: ProductId,
    pub shop_id: ShopId,
    pub amount: u32,
    pub amount_limit: u32,
}

/// Errors from stock ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum StockError {
    #[error("unknown variation {0}")]
    UnknownVariation(VariationId),

    #[error("insufficient stock for variation {variation_id}: requested {requested}, available {available}")]
    Insufficient {
        variation_id: VariationId,
        requested: u32,
        available: u32,
    },

    #[error("stock ledger unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for stock operations.
pub type StockResult<T> = std::result::Result<T, StockError>;

/// Contract for the stock ledger.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Returns the stock unit for a variation, or `None` when the
    /// variation is unknown.
    async fn variation_stock(&self, variation_id: VariationId) -> StockResult<Option<StockUnit>>;

    /// Inserts a stock unit or replaces the existing record for its
    /// variation.
    async fn upsert_unit(&self, unit: StockUnit) -> StockResult<()>;

    /// Atomically subtracts `quantity` from the available amount,
    /// returning the new amount. Fails with
    /// [`StockError::Insufficient`] when the amount would go negative
    /// and leaves the record untouched.
    async fn decrement(&self, variation_id: VariationId, quantity: u32) -> StockResult<u32>;

    /// Atomically subtracts `quantity`, flooring the amount at zero.
    /// The returned [`Decremented`] reports how much of the request
    /// could not be covered.
    async fn decrement_clamped(
        &self,
        variation_id: VariationId,
        quantity: u32,
    ) -> StockResult<Decremented>;

    /// Returns every active unit at or below its low-stock threshold.
    async fn scan_low_stock(&self) -> StockResult<Vec<LowStockAlert>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(amount: u32, amount_limit: u32) -> StockUnit {
        StockUnit {
            variation_id: VariationId::new(),
            product_id: ProductId::new(),
            shop_id: ShopId::new(),
            amount,
            amount_limit,
            is_active: true,
            unit_price: Money::from_cents(500),
        }
    }

    #[test]
    fn low_stock_threshold_is_inclusive() {
        assert!(unit(3, 3).is_low());
        assert!(unit(0, 3).is_low());
        assert!(!unit(4, 3).is_low());
    }

    #[test]
    fn decremented_reports_exactness() {
        assert!(Decremented {
            new_amount: 1,
            shortfall: 0
        }
        .is_exact());
        assert!(!Decremented {
            new_amount: 0,
            shortfall: 2
        }
        .is_exact());
    }
}
