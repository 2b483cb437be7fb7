//! Cart-to-order saga.
//!
//! Turning a cart into an order crosses three collaborators: the cart
//! service, the stock ledger and the order store. This crate owns the
//! coordinator that sequences those calls, reconciles the cart against
//! available stock, commits the order atomically and announces it on
//! the bus.
//!
//! The flow is deliberately conservative. Any mismatch between the cart
//! and the ledger corrects the cart first and refuses the order, so the
//! buyer re-confirms before anything is charged. Only a cart that fully
//! survives validation reaches the store.

pub mod coordinator;
pub mod error;

pub use coordinator::{OrderSagaCoordinator, SagaTimeouts};
pub use error::{CartAdjustment, CartFix, RemovalReason, Result, SagaError};
