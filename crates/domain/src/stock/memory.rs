//! In-memory stock ledger.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use common::VariationId;

use crate::stock::{Decremented, LowStockAlert, StockError, StockLedger, StockResult, StockUnit};

#[derive(Debug, Default)]
struct InMemoryStockState {
    // Each unit sits behind its own mutex so decrements for different
    // variations never contend with each other.
    units: HashMap<VariationId, Arc<Mutex<StockUnit>>>,
    outage: bool,
}

/// In-memory stock ledger for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockLedger {
    state: Arc<RwLock<InMemoryStockState>>,
}

impl InMemoryStockLedger {
    /// Creates a new empty in-memory stock ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the stock ledger being unreachable.
    pub fn set_outage(&self, outage: bool) {
        self.state.write().unwrap().outage = outage;
    }

    fn unit_handle(&self, variation_id: VariationId) -> StockResult<Arc<Mutex<StockUnit>>> {
        let state = self.state.read().unwrap();
        if state.outage {
            return Err(StockError::Unavailable(
                "simulated stock ledger outage".to_string(),
            ));
        }
        state
            .units
            .get(&variation_id)
            .cloned()
            .ok_or(StockError::UnknownVariation(variation_id))
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn variation_stock(&self, variation_id: VariationId) -> StockResult<Option<StockUnit>> {
        match self.unit_handle(variation_id) {
            Ok(handle) => Ok(Some(*handle.lock().unwrap())),
            Err(StockError::UnknownVariation(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn upsert_unit(&self, unit: StockUnit) -> StockResult<()> {
        let mut state = self.state.write().unwrap();
        if state.outage {
            return Err(StockError::Unavailable(
                "simulated stock ledger outage".to_string(),
            ));
        }
        match state.units.get(&unit.variation_id) {
            // Keep the existing handle so in-flight decrements observe
            // the replacement.
            Some(existing) => *existing.lock().unwrap() = unit,
            None => {
                state
                    .units
                    .insert(unit.variation_id, Arc::new(Mutex::new(unit)));
            }
        }
        Ok(())
    }

    async fn decrement(&self, variation_id: VariationId, quantity: u32) -> StockResult<u32> {
        let handle = self.unit_handle(variation_id)?;
        let mut unit = handle.lock().unwrap();
        if unit.amount < quantity {
            return Err(StockError::Insufficient {
                variation_id,
                requested: quantity,
                available: unit.amount,
            });
        }
        unit.amount -= quantity;
        Ok(unit.amount)
    }

    async fn decrement_clamped(
        &self,
        variation_id: VariationId,
        quantity: u32,
    ) -> StockResult<Decremented> {
        let handle = self.unit_handle(variation_id)?;
        let mut unit = handle.lock().unwrap();
        let shortfall = quantity.saturating_sub(unit.amount);
        unit.amount = unit.amount.saturating_sub(quantity);
        Ok(Decremented {
            new_amount: unit.amount,
            shortfall,
        })
    }

    async fn scan_low_stock(&self) -> StockResult<Vec<LowStockAlert>> {
        let state = self.state.read().unwrap();
        if state.outage {
            return Err(StockError::Unavailable(
                "simulated stock ledger outage".to_string(),
            ));
        }
        let mut alerts: Vec<LowStockAlert> = state
            .units
            .values()
            .map(|handle| *handle.lock().unwrap())
            .filter(|unit| unit.is_active && unit.is_low())
            .map(|unit| LowStockAlert {
                variation_id: unit.variation_id,
                product_id: unit.product_id,
                shop_id: unit.shop_id,
                amount: unit.amount,
                amount_limit: unit.amount_limit,
            })
            .collect();
        alerts.sort_by_key(|a| a.amount);
        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Money;
    use common::{ProductId, ShopId};

    async fn seeded(amount: u32, amount_limit: u32) -> (InMemoryStockLedger, VariationId) {
        let ledger = InMemoryStockLedger::new();
        let variation_id = VariationId::new();
        let unit = StockUnit {
            variation_id,
            product_id: ProductId::new(),
            shop_id: ShopId::new(),
            amount,
            amount_limit,
            is_active: true,
            unit_price: Money::from_cents(1250),
        };
        ledger.upsert_unit(unit).await.unwrap();
        (ledger, variation_id)
    }

    #[tokio::test]
    async fn strict_decrement_rejects_oversell() {
        let (ledger, variation_id) = seeded(5, 2).await;

        assert_eq!(ledger.decrement(variation_id, 3).await.unwrap(), 2);

        let err = ledger.decrement(variation_id, 3).await.unwrap_err();
        match err {
            StockError::Insufficient {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 3);
                assert_eq!(available, 2);
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }

        // Failed decrement leaves the amount untouched.
        let unit = ledger.variation_stock(variation_id).await.unwrap().unwrap();
        assert_eq!(unit.amount, 2);
    }

    #[tokio::test]
    async fn clamped_decrement_floors_at_zero() {
        let (ledger, variation_id) = seeded(2, 1).await;

        let outcome = ledger.decrement_clamped(variation_id, 5).await.unwrap();
        assert_eq!(outcome.new_amount, 0);
        assert_eq!(outcome.shortfall, 3);
        assert!(!outcome.is_exact());

        let outcome = ledger.decrement_clamped(variation_id, 1).await.unwrap();
        assert_eq!(outcome.new_amount, 0);
        assert_eq!(outcome.shortfall, 1);
    }

    #[tokio::test]
    async fn unknown_variation_is_reported() {
        let ledger = InMemoryStockLedger::new();
        let variation_id = VariationId::new();

        assert!(ledger.variation_stock(variation_id).await.unwrap().is_none());
        assert!(matches!(
            ledger.decrement(variation_id, 1).await.unwrap_err(),
            StockError::UnknownVariation(_)
        ));
        assert!(matches!(
            ledger.decrement_clamped(variation_id, 1).await.unwrap_err(),
            StockError::UnknownVariation(_)
        ));
    }

    #[tokio::test]
    async fn upsert_replaces_existing_unit() {
        let (ledger, variation_id) = seeded(5, 2).await;

        let mut unit = ledger.variation_stock(variation_id).await.unwrap().unwrap();
        unit.amount = 10;
        unit.is_active = false;
        ledger.upsert_unit(unit).await.unwrap();

        let stored = ledger.variation_stock(variation_id).await.unwrap().unwrap();
        assert_eq!(stored.amount, 10);
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn low_stock_scan_filters_inactive_and_healthy() {
        let ledger = InMemoryStockLedger::new();
        let low = StockUnit {
            variation_id: VariationId::new(),
            product_id: ProductId::new(),
            shop_id: ShopId::new(),
            amount: 2,
            amount_limit: 3,
            is_active: true,
            unit_price: Money::from_cents(100),
        };
        let healthy = StockUnit {
            amount: 9,
            variation_id: VariationId::new(),
            ..low
        };
        let inactive = StockUnit {
            is_active: false,
            variation_id: VariationId::new(),
            ..low
        };
        ledger.upsert_unit(low).await.unwrap();
        ledger.upsert_unit(healthy).await.unwrap();
        ledger.upsert_unit(inactive).await.unwrap();

        let alerts = ledger.scan_low_stock().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].variation_id, low.variation_id);
        assert_eq!(alerts[0].amount, 2);
    }

    #[tokio::test]
    async fn concurrent_decrements_never_oversell() {
        let (ledger, variation_id) = seeded(10, 0).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.decrement(variation_id, 1).await.is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 10);
        let unit = ledger.variation_stock(variation_id).await.unwrap().unwrap();
        assert_eq!(unit.amount, 0);
    }
}
