//! Periodic low-stock sweep.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use common::VariationId;
use domain::{IntegrationEvent, LowStockAlert, LowStockEvent, StockError, StockLedger, exchanges};
use event_bus::Publisher;

/// Sweeps the ledger on a fixed cadence and announces depleted units.
///
/// A unit is announced once per depletion level: the sweep remembers
/// the amount it last announced per variation and stays quiet while
/// nothing changed, so analytics sees state transitions rather than a
/// heartbeat. A unit that recovers above its threshold drops out of
/// the memory and will be announced again on the next dip.
pub struct LowStockScanner<L: StockLedger> {
    ledger: L,
    publisher: Publisher,
    announced: Mutex<HashMap<VariationId, u32>>,
}

impl<L: StockLedger> LowStockScanner<L> {
    /// Creates a scanner over the given ledger and analytics publisher.
    pub fn new(ledger: L, publisher: Publisher) -> Self {
        Self {
            ledger,
            publisher,
            announced: Mutex::new(HashMap::new()),
        }
    }

    /// Runs one sweep, returning how many alerts were announced.
    pub async fn run_once(&self) -> Result<usize, StockError> {
        let alerts = self.ledger.scan_low_stock().await?;

        let to_announce: Vec<LowStockAlert> = {
            let mut announced = self.announced.lock().unwrap();
            // Forget units that recovered so a later dip alerts again.
            announced.retain(|variation_id, _| {
                alerts.iter().any(|a| a.variation_id == *variation_id)
            });
            alerts
                .into_iter()
                .filter(|alert| announced.get(&alert.variation_id) != Some(&alert.amount))
                .collect()
        };

        let mut published = 0;
        for alert in to_announce {
            let event = LowStockEvent::from(alert);
            match event.to_message() {
                Ok(message) => {
                    match self.publisher.publish(exchanges::ANALYTICS, message).await {
                        Ok(()) => {
                            self.announced
                                .lock()
                                .unwrap()
                                .insert(alert.variation_id, alert.amount);
                            published += 1;
                            metrics::counter!("low_stock_alerts").increment(1);
                            tracing::warn!(
                                variation_id = %alert.variation_id,
                                amount = alert.amount,
                                amount_limit = alert.amount_limit,
                                "variation at or below its stock threshold"
                            );
                        }
                        // Not remembered, so the next sweep retries it.
                        Err(err) => {
                            tracing::warn!(
                                variation_id = %alert.variation_id,
                                error = %err,
                                "low stock alert publish failed"
                            );
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        variation_id = %alert.variation_id,
                        error = %err,
                        "low stock alert encode failed"
                    );
                }
            }
        }

        Ok(published)
    }

    /// Sweeps forever on a fixed cadence. Sweep failures are logged and
    /// the loop carries on.
    pub async fn run(&self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.run_once().await {
                tracing::warn!(error = %err, "low stock sweep failed");
            }
        }
    }
}
