use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{Message, Result, routing::BindingPattern};

/// A message as seen by a consumer, with redelivery bookkeeping.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The message being delivered.
    pub message: Message,

    /// How many times this message was delivered before. Zero on the
    /// first attempt.
    pub redelivery_count: u32,
}

impl Delivery {
    /// Whether this delivery is a redelivery of an earlier attempt.
    pub fn is_redelivered(&self) -> bool {
        self.redelivery_count > 0
    }

    /// Deserializes the message payload into a typed event.
    pub fn payload_as<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_value(self.message.payload.clone())
    }
}

/// Error returned by a message handler.
///
/// Retryable failures are redelivered up to the queue's retry budget.
/// Fatal failures (a payload that will never deserialize, for example)
/// go straight to the dead letter store.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("retryable: {0}")]
    Retryable(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl HandlerError {
    /// Wraps any error as retryable.
    pub fn retryable(err: impl std::fmt::Display) -> Self {
        Self::Retryable(err.to_string())
    }

    /// Wraps any error as fatal.
    pub fn fatal(err: impl std::fmt::Display) -> Self {
        Self::Fatal(err.to_string())
    }
}

/// A consumer of bus messages.
///
/// One handler instance serves one queue. The bus never re-enters
/// `handle` concurrently for the same queue, so handlers may keep
/// per-queue state without extra locking.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Short stable name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Processes one delivery.
    async fn handle(&self, delivery: &Delivery) -> std::result::Result<(), HandlerError>;
}

/// A queue binding: which exchange to bind on, the queue name, and the
/// topic patterns the queue receives.
///
/// A message matching several patterns of the same queue is still
/// delivered to that queue once.
#[derive(Debug, Clone)]
pub struct QueueBinding {
    pub exchange: String,
    pub queue: String,
    pub patterns: Vec<BindingPattern>,
}

impl QueueBinding {
    /// Creates a binding with a single pattern.
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        pattern: BindingPattern,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            patterns: vec![pattern],
        }
    }

    /// Adds a further pattern to the same queue.
    pub fn and_pattern(mut self, pattern: BindingPattern) -> Self {
        self.patterns.push(pattern);
        self
    }
}

/// Core trait for event bus implementations.
///
/// The bus is a durable topic exchange: publishers send messages with a
/// dot-separated routing key, consumers bind queues with wildcard
/// patterns, and every bound queue whose pattern matches receives its
/// own copy. Delivery is at-least-once; consumers own idempotence.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a message to an exchange.
    ///
    /// The routing key is matched against every binding on the exchange
    /// and a copy is enqueued for each matching queue. A key matching no
    /// binding is dropped. Publish order is preserved per routing key
    /// for a single publisher; no ordering holds across keys.
    async fn publish(&self, exchange: &str, message: Message) -> Result<()>;

    /// Binds a queue and starts delivering matching messages to `handler`.
    ///
    /// A handler error triggers redelivery up to the bus's retry budget,
    /// after which the message is parked in the dead letter store and
    /// the queue moves on.
    async fn subscribe(&self, binding: QueueBinding, handler: Arc<dyn MessageHandler>)
    -> Result<()>;
}
