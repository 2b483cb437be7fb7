use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::Message;

/// A message that exhausted its redeliveries and was taken out of
/// circulation for manual inspection.
#[derive(Debug, Clone)]
pub struct ParkedMessage {
    /// The queue the message failed on.
    pub queue: String,

    /// The original message, untouched.
    pub message: Message,

    /// The handler error from the last attempt.
    pub error: String,

    /// How many delivery attempts were made in total.
    pub failure_count: u32,

    /// When the first attempt failed.
    pub first_failed_at: DateTime<Utc>,

    /// When the last attempt failed.
    pub last_failed_at: DateTime<Utc>,
}

/// Store of parked messages.
///
/// Parked messages are never redelivered automatically; getting them
/// back into circulation is an operator decision.
#[derive(Clone, Default)]
pub struct DeadLetterStore {
    parked: Arc<RwLock<Vec<ParkedMessage>>>,
}

impl DeadLetterStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a message.
    pub async fn park(&self, parked: ParkedMessage) {
        tracing::error!(
            queue = %parked.queue,
            message_id = %parked.message.message_id,
            routing_key = %parked.message.routing_key,
            failure_count = parked.failure_count,
            error = %parked.error,
            "message parked in dead letter store"
        );
        metrics::counter!("bus_messages_parked").increment(1);
        self.parked.write().await.push(parked);
    }

    /// Returns a snapshot of every parked message.
    pub async fn parked(&self) -> Vec<ParkedMessage> {
        self.parked.read().await.clone()
    }

    /// Returns the parked messages for one queue.
    pub async fn parked_for_queue(&self, queue: &str) -> Vec<ParkedMessage> {
        self.parked
            .read()
            .await
            .iter()
            .filter(|p| p.queue == queue)
            .cloned()
            .collect()
    }

    /// Returns the number of parked messages.
    pub async fn len(&self) -> usize {
        self.parked.read().await.len()
    }

    /// Whether the store holds no parked messages.
    pub async fn is_empty(&self) -> bool {
        self.parked.read().await.is_empty()
    }
}
