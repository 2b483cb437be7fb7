use thiserror::Error;

/// Errors that can occur when interacting with the event bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// A routing key failed validation.
    #[error("Invalid routing key '{key}': {reason}")]
    InvalidRoutingKey { key: String, reason: String },

    /// A binding pattern failed validation.
    #[error("Invalid binding pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A queue with this name is already bound on the bus.
    #[error("Queue already bound: {0}")]
    QueueAlreadyBound(String),

    /// The broker connection is down. The operation may be retried.
    #[error("Broker connection lost: {0}")]
    ConnectionLost(String),

    /// Publishing kept failing until the retry budget ran out.
    #[error("Publish failed after {attempts} attempts: {reason}")]
    PublishExhausted { attempts: u32, reason: String },

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
