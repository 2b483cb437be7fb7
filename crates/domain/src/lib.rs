//! Domain layer for the order platform.
//!
//! This crate provides the three concerns the checkout flow revolves
//! around:
//! - the order model with its per-item status state machine and the
//!   [`OrderStore`] persistence trait,
//! - the [`CartService`] collaborator with optimistic version tokens,
//! - the [`StockLedger`] with per-variation serialized decrements.
//!
//! Each trait ships an in-memory implementation for tests and local
//! runs, and a PostgreSQL implementation for deployment. The wire
//! payloads the platform exchanges over the bus live in [`events`].

pub mod cart;
pub mod error;
pub mod events;
pub mod order;
pub mod stock;

pub use cart::{
    CartError, CartLine, CartService, CartSnapshot, CartVersion, memory::InMemoryCartService,
};
pub use error::{DomainError, Result};
pub use events::{
    IntegrationEvent, LowStockEvent, OrderApprovedEvent, OrderCreatedEvent, OrderItemCreatedEvent,
    OrderItemStatusUpdatedEvent, exchanges, routing_keys,
};
pub use order::{
    DraftLine, Money, Order, OrderDraft, OrderItem, OrderItemStatus, OrderStore, StatusUpdate,
    memory::InMemoryOrderStore, postgres::PostgresOrderStore,
};
pub use stock::{
    Decremented, LowStockAlert, StockError, StockLedger, StockUnit, memory::InMemoryStockLedger,
    postgres::PostgresStockLedger,
};
