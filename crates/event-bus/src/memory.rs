use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, mpsc};

use crate::{
    BusError, DeadLetterStore, Delivery, Message, ParkedMessage, Result,
    bus::{EventBus, HandlerError, MessageHandler, QueueBinding},
    routing::BindingPattern,
};

/// Redelivery policy for queues on the in-memory bus.
#[derive(Debug, Clone)]
pub struct RedeliveryPolicy {
    /// Total delivery attempts per message, the first one included.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(25),
        }
    }
}

struct Binding {
    queue: String,
    patterns: Vec<BindingPattern>,
}

struct BusInner {
    exchanges: RwLock<HashMap<String, Vec<Binding>>>,
    queues: RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>,
    published: RwLock<HashMap<String, Vec<Message>>>,
    dead_letters: DeadLetterStore,
    redelivery: RedeliveryPolicy,
    fail_publish: AtomicBool,
    in_flight: Arc<AtomicUsize>,
}

/// In-memory event bus implementation for testing and local runs.
///
/// Provides the same topic-exchange contract as a broker-backed
/// implementation: wildcard bindings, fan-out to every matching queue,
/// at-least-once delivery with bounded redeliveries and dead-letter
/// parking. One worker task serves each queue, so deliveries to a
/// queue are strictly FIFO and never concurrent.
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<BusInner>,
}

impl InMemoryEventBus {
    /// Creates a bus with the default redelivery policy.
    pub fn new() -> Self {
        Self::with_redelivery(RedeliveryPolicy::default())
    }

    /// Creates a bus with an explicit redelivery policy.
    pub fn with_redelivery(redelivery: RedeliveryPolicy) -> Self {
        Self {
            inner: Arc::new(BusInner {
                exchanges: RwLock::new(HashMap::new()),
                queues: RwLock::new(HashMap::new()),
                published: RwLock::new(HashMap::new()),
                dead_letters: DeadLetterStore::new(),
                redelivery,
                fail_publish: AtomicBool::new(false),
                in_flight: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Handle to the dead letter store shared by every queue.
    pub fn dead_letters(&self) -> DeadLetterStore {
        self.inner.dead_letters.clone()
    }

    /// Every message published to an exchange, in publish order.
    pub async fn published(&self, exchange: &str) -> Vec<Message> {
        self.inner
            .published
            .read()
            .await
            .get(exchange)
            .cloned()
            .unwrap_or_default()
    }

    /// Published messages on an exchange filtered by routing key.
    pub async fn published_with_key(&self, exchange: &str, key: &str) -> Vec<Message> {
        self.published(exchange)
            .await
            .into_iter()
            .filter(|m| m.routing_key.as_str() == key)
            .collect()
    }

    /// When set, `publish` fails with `ConnectionLost`. Simulates a
    /// broker outage for retry tests.
    pub fn set_fail_publish(&self, fail: bool) {
        self.inner.fail_publish.store(fail, Ordering::Release);
    }

    /// Waits until every enqueued message has settled, either handled
    /// or parked. Lets tests assert on final state deterministically.
    pub async fn drain(&self) {
        while self.inner.in_flight.load(Ordering::Acquire) > 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, exchange: &str, message: Message) -> Result<()> {
        if self.inner.fail_publish.load(Ordering::Acquire) {
            metrics::counter!("bus_publish_failures").increment(1);
            return Err(BusError::ConnectionLost(
                "simulated broker outage".to_string(),
            ));
        }

        self.inner
            .published
            .write()
            .await
            .entry(exchange.to_string())
            .or_default()
            .push(message.clone());
        metrics::counter!("bus_messages_published").increment(1);
        tracing::debug!(
            exchange,
            routing_key = %message.routing_key,
            message_id = %message.message_id,
            "message published"
        );

        let exchanges = self.inner.exchanges.read().await;
        let Some(bindings) = exchanges.get(exchange) else {
            // No queue bound on this exchange: the message is dropped,
            // matching unroutable-message behavior on a topic exchange.
            return Ok(());
        };

        let queues = self.inner.queues.read().await;
        for binding in bindings {
            let matched = binding
                .patterns
                .iter()
                .any(|p| p.matches(&message.routing_key));
            if matched && let Some(tx) = queues.get(&binding.queue) {
                self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
                if tx.send(message.clone()).is_err() {
                    self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
                }
            }
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        binding: QueueBinding,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut queues = self.inner.queues.write().await;
            if queues.contains_key(&binding.queue) {
                return Err(BusError::QueueAlreadyBound(binding.queue));
            }
            queues.insert(binding.queue.clone(), tx);
        }

        tracing::info!(
            exchange = %binding.exchange,
            queue = %binding.queue,
            handler = handler.name(),
            patterns = %binding
                .patterns
                .iter()
                .map(BindingPattern::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            "queue bound"
        );

        spawn_queue_worker(
            binding.queue.clone(),
            rx,
            handler,
            self.inner.redelivery.clone(),
            self.inner.dead_letters.clone(),
            Arc::clone(&self.inner.in_flight),
        );

        self.inner
            .exchanges
            .write()
            .await
            .entry(binding.exchange.clone())
            .or_default()
            .push(Binding {
                queue: binding.queue,
                patterns: binding.patterns,
            });

        Ok(())
    }
}

fn spawn_queue_worker(
    queue: String,
    mut rx: mpsc::UnboundedReceiver<Message>,
    handler: Arc<dyn MessageHandler>,
    policy: RedeliveryPolicy,
    dead_letters: DeadLetterStore,
    in_flight: Arc<AtomicUsize>,
) {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            deliver_until_settled(&queue, message, handler.as_ref(), &policy, &dead_letters).await;
            in_flight.fetch_sub(1, Ordering::AcqRel);
        }
        tracing::debug!(queue, "queue worker stopped");
    });
}

/// Drives one message to a terminal outcome: handled, or parked after
/// the retry budget (or a fatal error).
async fn deliver_until_settled(
    queue: &str,
    message: Message,
    handler: &dyn MessageHandler,
    policy: &RedeliveryPolicy,
    dead_letters: &DeadLetterStore,
) {
    let mut delivery = Delivery {
        message,
        redelivery_count: 0,
    };
    let mut first_failed_at = None;

    loop {
        match handler.handle(&delivery).await {
            Ok(()) => {
                metrics::counter!("bus_messages_handled").increment(1);
                tracing::debug!(
                    queue,
                    handler = handler.name(),
                    message_id = %delivery.message.message_id,
                    redeliveries = delivery.redelivery_count,
                    "message handled"
                );
                return;
            }
            Err(err) => {
                let attempts = delivery.redelivery_count + 1;
                first_failed_at.get_or_insert_with(Utc::now);
                let fatal = matches!(err, HandlerError::Fatal(_));

                if fatal || attempts >= policy.max_attempts {
                    dead_letters
                        .park(ParkedMessage {
                            queue: queue.to_string(),
                            message: delivery.message,
                            error: err.to_string(),
                            failure_count: attempts,
                            first_failed_at: first_failed_at.unwrap_or_else(Utc::now),
                            last_failed_at: Utc::now(),
                        })
                        .await;
                    return;
                }

                tracing::warn!(
                    queue,
                    handler = handler.name(),
                    message_id = %delivery.message.message_id,
                    attempts,
                    error = %err,
                    "handler failed; message will be redelivered"
                );
                metrics::counter!("bus_redeliveries").increment(1);
                delivery.redelivery_count += 1;
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}
