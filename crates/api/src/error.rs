//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{CartError, DomainError, StockError};
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The caller may not act on this resource.
    Forbidden(String),
    /// Order persistence error.
    Domain(DomainError),
    /// Cart collaborator error.
    Cart(CartError),
    /// Stock ledger error.
    Stock(StockError),
    /// Checkout saga error.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, error_body(&msg)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(&msg)),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, error_body(&msg)),
            ApiError::Domain(err) => domain_error_to_response(&err),
            ApiError::Cart(err) => cart_error_to_response(&err),
            ApiError::Stock(err) => stock_error_to_response(&err),
            ApiError::Saga(err) => saga_error_to_response(&err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, error_body(&msg))
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

fn error_body(message: &impl std::fmt::Display) -> serde_json::Value {
    serde_json::json!({ "error": message.to_string() })
}

fn domain_error_to_response(err: &DomainError) -> (StatusCode, serde_json::Value) {
    let status = match err {
        DomainError::OrderNotFound(_) | DomainError::OrderItemNotFound(_) => StatusCode::NOT_FOUND,
        DomainError::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
        DomainError::NoItems => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
        DomainError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::Database(_) | DomainError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, error_body(err))
}

fn cart_error_to_response(err: &CartError) -> (StatusCode, serde_json::Value) {
    let status = match err {
        CartError::NotFound(_) | CartError::LineNotFound { .. } => StatusCode::NOT_FOUND,
        CartError::VersionConflict { .. } => StatusCode::CONFLICT,
        CartError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, error_body(err))
}

fn stock_error_to_response(err: &StockError) -> (StatusCode, serde_json::Value) {
    let status = match err {
        StockError::UnknownVariation(_) => StatusCode::NOT_FOUND,
        StockError::Insufficient { .. } => StatusCode::CONFLICT,
        StockError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StockError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error_body(err))
}

/// Conflict responses carry the machine-readable detail the client
/// needs to recover: `adjustments` lists what stock validation changed,
/// `reason` flags a concurrent cart edit.
fn saga_error_to_response(err: &SagaError) -> (StatusCode, serde_json::Value) {
    match err {
        SagaError::EmptyCart => (StatusCode::UNPROCESSABLE_ENTITY, error_body(err)),
        SagaError::StockConflict { adjustments } => (
            StatusCode::CONFLICT,
            serde_json::json!({ "error": err.to_string(), "adjustments": adjustments }),
        ),
        SagaError::CartChanged { .. } => (
            StatusCode::CONFLICT,
            serde_json::json!({ "error": err.to_string(), "reason": "cart_changed" }),
        ),
        SagaError::DependencyUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, error_body(err))
        }
        SagaError::Persistence(inner) => domain_error_to_response(inner),
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        ApiError::Cart(err)
    }
}

impl From<StockError> for ApiError {
    fn from(err: StockError) -> Self {
        ApiError::Stock(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
