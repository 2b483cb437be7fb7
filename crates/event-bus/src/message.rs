use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::routing::RoutingKey;

/// Unique identifier for a published message.
///
/// Consumers that need stronger idempotence than their natural keys
/// provide can deduplicate on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a message ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<MessageId> for Uuid {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

/// A message envelope carried across the bus.
///
/// The payload is opaque JSON; routing happens entirely on the routing
/// key. Headers carry optional correlation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier, stable across redeliveries of the same message.
    pub message_id: MessageId,

    /// Dot-separated topic key the exchange routes on.
    pub routing_key: RoutingKey,

    /// The message payload as JSON.
    pub payload: serde_json::Value,

    /// When the message was handed to the bus.
    pub published_at: DateTime<Utc>,

    /// Additional metadata about the message.
    pub headers: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Creates a new message builder.
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }
}

/// Builder for constructing messages.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    message_id: Option<MessageId>,
    routing_key: Option<RoutingKey>,
    payload: Option<serde_json::Value>,
    published_at: Option<DateTime<Utc>>,
    headers: HashMap<String, serde_json::Value>,
}

impl MessageBuilder {
    /// Sets the message ID. If not set, a new ID will be generated.
    pub fn message_id(mut self, id: MessageId) -> Self {
        self.message_id = Some(id);
        self
    }

    /// Sets the routing key.
    pub fn routing_key(mut self, key: RoutingKey) -> Self {
        self.routing_key = Some(key);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the publication timestamp. If not set, the current time is used.
    pub fn published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }

    /// Adds a header entry.
    pub fn header(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.headers.insert(key.into(), value);
        self
    }

    /// Builds the message.
    ///
    /// # Panics
    ///
    /// Panics if required fields (routing_key, payload) are not set.
    pub fn build(self) -> Message {
        Message {
            message_id: self.message_id.unwrap_or_default(),
            routing_key: self.routing_key.expect("routing_key is required"),
            payload: self.payload.expect("payload is required"),
            published_at: self.published_at.unwrap_or_else(Utc::now),
            headers: self.headers,
        }
    }

    /// Tries to build the message, returning None if required fields are missing.
    pub fn try_build(self) -> Option<Message> {
        Some(Message {
            message_id: self.message_id.unwrap_or_default(),
            routing_key: self.routing_key?,
            payload: self.payload?,
            published_at: self.published_at.unwrap_or_else(Utc::now),
            headers: self.headers,
        })
    }
}
