//! Topic-exchange event bus connecting the order platform services.
//!
//! Publishers send [`Message`]s to a named exchange with a dot-separated
//! [`RoutingKey`]; consumers bind queues with [`BindingPattern`]s where
//! `*` matches one segment and `#` matches zero or more. Delivery is
//! at-least-once: consumers own idempotence, failed deliveries are
//! retried a bounded number of times and then parked in the
//! [`DeadLetterStore`].

pub mod bus;
pub mod dlq;
pub mod error;
pub mod memory;
pub mod message;
pub mod publisher;
pub mod retry;
pub mod routing;

pub use bus::{Delivery, EventBus, HandlerError, MessageHandler, QueueBinding};
pub use dlq::{DeadLetterStore, ParkedMessage};
pub use error::{BusError, Result};
pub use memory::{InMemoryEventBus, RedeliveryPolicy};
pub use message::{Message, MessageBuilder, MessageId};
pub use publisher::Publisher;
pub use retry::RetryPolicy;
pub use routing::{BindingPattern, RoutingKey};
