use std::sync::Arc;

use crate::{BusError, EventBus, Message, Result, retry::RetryPolicy};

/// Publisher that retries transient broker failures with bounded
/// exponential backoff.
///
/// After the retry budget runs out the failure is surfaced as
/// [`BusError::PublishExhausted`]; what to do with an unpublishable
/// message is the caller's decision.
#[derive(Clone)]
pub struct Publisher {
    bus: Arc<dyn EventBus>,
    policy: RetryPolicy,
}

impl Publisher {
    /// Creates a publisher with the default retry policy.
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self::with_policy(bus, RetryPolicy::default())
    }

    /// Creates a publisher with an explicit retry policy.
    pub fn with_policy(bus: Arc<dyn EventBus>, policy: RetryPolicy) -> Self {
        Self { bus, policy }
    }

    /// Publishes a message, retrying on failure.
    pub async fn publish(&self, exchange: &str, message: Message) -> Result<()> {
        let mut last_error: Option<BusError> = None;

        for attempt in 1..=self.policy.max_attempts {
            match self.bus.publish(exchange, message.clone()).await {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::info!(
                            exchange,
                            routing_key = %message.routing_key,
                            attempt,
                            "publish recovered after retry"
                        );
                    }
                    return Ok(());
                }
                Err(err) => {
                    if attempt < self.policy.max_attempts {
                        let delay = self.policy.delay_for_attempt(attempt);
                        tracing::warn!(
                            exchange,
                            routing_key = %message.routing_key,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "publish failed, backing off"
                        );
                        metrics::counter!("bus_publish_retries").increment(1);
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(err);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        metrics::counter!("bus_publish_exhausted").increment(1);
        Err(BusError::PublishExhausted {
            attempts: self.policy.max_attempts,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{InMemoryEventBus, routing::RoutingKey};

    fn msg() -> Message {
        Message::builder()
            .routing_key(RoutingKey::parse("order.created").unwrap())
            .payload_raw(serde_json::json!({}))
            .build()
    }

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn publishes_first_try_when_broker_is_up() {
        let bus = InMemoryEventBus::new();
        let publisher = Publisher::with_policy(Arc::new(bus.clone()), quick_policy(3));

        publisher.publish("orders", msg()).await.unwrap();
        assert_eq!(bus.published("orders").await.len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_attempts() {
        let bus = InMemoryEventBus::new();
        bus.set_fail_publish(true);
        let publisher = Publisher::with_policy(Arc::new(bus.clone()), quick_policy(3));

        let result = publisher.publish("orders", msg()).await;
        assert!(matches!(
            result,
            Err(BusError::PublishExhausted { attempts: 3, .. })
        ));
        assert!(bus.published("orders").await.is_empty());
    }

    #[tokio::test]
    async fn recovers_when_broker_comes_back() {
        let bus = InMemoryEventBus::new();
        bus.set_fail_publish(true);
        let publisher = Publisher::with_policy(Arc::new(bus.clone()), quick_policy(5));

        let bus_for_heal = bus.clone();
        let heal = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3)).await;
            bus_for_heal.set_fail_publish(false);
        });

        publisher.publish("orders", msg()).await.unwrap();
        heal.await.unwrap();

        assert_eq!(bus.published("orders").await.len(), 1);
    }
}
