//! Applies committed orders to the stock ledger.

use async_trait::async_trait;
use domain::{OrderCreatedEvent, StockError, StockLedger, exchanges, routing_keys};
use event_bus::{BindingPattern, Delivery, HandlerError, MessageHandler, QueueBinding};

use crate::dedup::ProcessedRegistry;

/// Consumes `order.created` and decrements stock for every ordered line.
///
/// The order is already committed when this runs, so a line the ledger
/// can no longer cover is clamped to zero and logged instead of failing
/// the message. Each applied decrement is recorded under its
/// `{order_id}:{variation_id}` key, so a redelivered message never
/// applies twice.
pub struct StockReducer<L: StockLedger> {
    ledger: L,
    processed: ProcessedRegistry,
}

impl<L: StockLedger> StockReducer<L> {
    /// Creates a reducer over the given ledger.
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            processed: ProcessedRegistry::new(),
        }
    }

    /// The queue binding this consumer is subscribed with.
    pub fn binding() -> event_bus::Result<QueueBinding> {
        Ok(QueueBinding::new(
            exchanges::ORDERS,
            "stock-reducer",
            BindingPattern::parse(routing_keys::ORDER_CREATED)?,
        ))
    }
}

#[async_trait]
impl<L: StockLedger> MessageHandler for StockReducer<L> {
    fn name(&self) -> &'static str {
        "stock-reducer"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let event: OrderCreatedEvent = delivery.payload_as().map_err(HandlerError::fatal)?;

        for item in &event.items {
            let key = format!("{}:{}", event.order_id, item.product_variation_id);
            if self.processed.contains(&key) {
                metrics::counter!("stock_reducer_duplicates").increment(1);
                tracing::debug!(
                    order_id = %event.order_id,
                    variation_id = %item.product_variation_id,
                    "decrement already applied, skipping"
                );
                continue;
            }

            match self
                .ledger
                .decrement_clamped(item.product_variation_id, item.quantity)
                .await
            {
                Ok(result) => {
                    metrics::counter!("stock_decrements").increment(1);
                    if result.shortfall > 0 {
                        metrics::counter!("stock_decrements_clamped").increment(1);
                        tracing::warn!(
                            order_id = %event.order_id,
                            variation_id = %item.product_variation_id,
                            requested = item.quantity,
                            shortfall = result.shortfall,
                            "stock underrun, amount clamped to zero"
                        );
                    }
                    // Marked only after the write took, so a retryable
                    // failure further down redelivers just the rest.
                    self.processed.mark(key);
                }
                Err(StockError::UnknownVariation(variation_id)) => {
                    // The order is committed; a unit missing from the
                    // ledger is a data problem to surface, not a reason
                    // to redeliver.
                    tracing::warn!(
                        order_id = %event.order_id,
                        %variation_id,
                        "ordered variation missing from the ledger"
                    );
                    self.processed.mark(key);
                }
                Err(err) => return Err(HandlerError::retryable(err)),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::{CartId, OrderId, UserId, VariationId};
    use domain::events::OrderCreatedItem;
    use domain::{IntegrationEvent, InMemoryStockLedger, Money, StockUnit};
    use event_bus::RoutingKey;

    use super::*;

    fn unit(variation_id: VariationId, amount: u32) -> StockUnit {
        StockUnit {
            variation_id,
            product_id: common::ProductId::new(),
            shop_id: common::ShopId::new(),
            amount,
            amount_limit: 0,
            is_active: true,
            unit_price: Money::from_cents(900),
        }
    }

    fn created_event(lines: &[(VariationId, u32)]) -> OrderCreatedEvent {
        OrderCreatedEvent {
            order_id: OrderId::new(),
            user_uuid: UserId::new(),
            cart_id: CartId::new(),
            items: lines
                .iter()
                .map(|&(product_variation_id, quantity)| OrderCreatedItem {
                    product_variation_id,
                    quantity,
                })
                .collect(),
        }
    }

    fn delivery_of(event: &OrderCreatedEvent) -> Delivery {
        Delivery {
            message: event.to_message().unwrap(),
            redelivery_count: 0,
        }
    }

    async fn amount_of(ledger: &InMemoryStockLedger, variation_id: VariationId) -> u32 {
        ledger
            .variation_stock(variation_id)
            .await
            .unwrap()
            .unwrap()
            .amount
    }

    #[tokio::test]
    async fn applies_each_line_exactly_once() {
        let ledger = InMemoryStockLedger::new();
        let (a, b) = (VariationId::new(), VariationId::new());
        ledger.upsert_unit(unit(a, 10)).await.unwrap();
        ledger.upsert_unit(unit(b, 5)).await.unwrap();

        let reducer = StockReducer::new(ledger.clone());
        let delivery = delivery_of(&created_event(&[(a, 3), (b, 5)]));

        reducer.handle(&delivery).await.unwrap();
        assert_eq!(amount_of(&ledger, a).await, 7);
        assert_eq!(amount_of(&ledger, b).await, 0);

        // Redelivery changes nothing.
        reducer.handle(&delivery).await.unwrap();
        assert_eq!(amount_of(&ledger, a).await, 7);
        assert_eq!(amount_of(&ledger, b).await, 0);
    }

    #[tokio::test]
    async fn clamps_to_zero_when_stock_moved_since_the_saga() {
        let ledger = InMemoryStockLedger::new();
        let variation_id = VariationId::new();
        ledger.upsert_unit(unit(variation_id, 1)).await.unwrap();

        let reducer = StockReducer::new(ledger.clone());
        let delivery = delivery_of(&created_event(&[(variation_id, 3)]));

        reducer.handle(&delivery).await.unwrap();
        assert_eq!(amount_of(&ledger, variation_id).await, 0);
    }

    #[tokio::test]
    async fn missing_variation_is_skipped_not_retried() {
        let ledger = InMemoryStockLedger::new();
        let known = VariationId::new();
        ledger.upsert_unit(unit(known, 4)).await.unwrap();

        let reducer = StockReducer::new(ledger.clone());
        let delivery = delivery_of(&created_event(&[(VariationId::new(), 2), (known, 1)]));

        reducer.handle(&delivery).await.unwrap();
        assert_eq!(amount_of(&ledger, known).await, 3);
    }

    #[tokio::test]
    async fn ledger_outage_is_retryable_and_replay_safe() {
        let ledger = InMemoryStockLedger::new();
        let (a, b) = (VariationId::new(), VariationId::new());
        ledger.upsert_unit(unit(a, 10)).await.unwrap();
        ledger.upsert_unit(unit(b, 8)).await.unwrap();

        let reducer = StockReducer::new(ledger.clone());
        let delivery = delivery_of(&created_event(&[(a, 3), (b, 5)]));

        ledger.set_outage(true);
        let err = reducer.handle(&delivery).await.unwrap_err();
        assert!(matches!(err, HandlerError::Retryable(_)));
        ledger.set_outage(false);
        assert_eq!(amount_of(&ledger, a).await, 10);

        reducer.handle(&delivery).await.unwrap();
        assert_eq!(amount_of(&ledger, a).await, 7);
        assert_eq!(amount_of(&ledger, b).await, 3);
    }

    #[tokio::test]
    async fn malformed_payload_is_fatal() {
        let reducer = StockReducer::new(InMemoryStockLedger::new());
        let delivery = Delivery {
            message: event_bus::Message::builder()
                .routing_key(RoutingKey::parse(routing_keys::ORDER_CREATED).unwrap())
                .payload_raw(serde_json::json!({"not": "an order"}))
                .build(),
            redelivery_count: 0,
        };

        let err = reducer.handle(&delivery).await.unwrap_err();
        assert!(matches!(err, HandlerError::Fatal(_)));
    }

    #[test]
    fn binding_listens_for_created_orders() {
        let binding = StockReducer::<InMemoryStockLedger>::binding().unwrap();
        assert_eq!(binding.exchange, exchanges::ORDERS);
        assert_eq!(binding.patterns.len(), 1);
    }
}
