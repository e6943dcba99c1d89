use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use sea_orm::SqlErr;
use serde::{Deserialize, Serialize};

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Message returned for checkout failures that need a human to look at them.
pub const CONTACT_SUPPORT_MESSAGE: &str =
    "We could not confirm your order. Please contact support before trying again";

/// Standard error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable error code, when one applies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    fn new(status: StatusCode, message: String, details: Option<String>) -> Self {
        Self {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            details,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Failure outcomes of a checkout submission.
///
/// `InvalidCart` and `PaymentDeclined` are user-correctable and leave no side
/// effects. `PaymentAmbiguous` and `ChargedButNotRecorded` mean money may have
/// moved; they are surfaced with a generic message and recorded for operators.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Invalid cart: {0}")]
    InvalidCart(String),

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Payment outcome unknown for submission {idempotency_key}")]
    PaymentAmbiguous { idempotency_key: String },

    #[error("Payment gateway error: {0}")]
    PaymentGatewayError(String),

    #[error("Charge {charge_id} of {amount_minor} minor units was not recorded: {reason}")]
    ChargedButNotRecorded {
        charge_id: String,
        amount_minor: i64,
        idempotency_key: String,
        reason: String,
    },

    #[error("Conflicting submission: {0}")]
    ConcurrencyConflict(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),
}

impl CheckoutError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCart(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            Self::PaymentAmbiguous { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::PaymentGatewayError(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ChargedButNotRecorded { .. } | Self::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ConcurrencyConflict(_) => StatusCode::CONFLICT,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCart(_) => "invalid_cart",
            Self::PaymentDeclined(_) => "payment_declined",
            Self::PaymentAmbiguous { .. } => "payment_ambiguous",
            Self::PaymentGatewayError(_) => "payment_gateway_error",
            Self::ChargedButNotRecorded { .. } => "charged_but_not_recorded",
            Self::ConcurrencyConflict(_) => "concurrency_conflict",
            Self::DatabaseError(_) => "database_error",
        }
    }

    /// Whether the caller may resubmit the same checkout on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PaymentGatewayError(_) | Self::ConcurrencyConflict(_) | Self::DatabaseError(_)
        )
    }

    /// Whether money may have moved without a matching order row.
    pub fn requires_reconciliation(&self) -> bool {
        matches!(
            self,
            Self::PaymentAmbiguous { .. } | Self::ChargedButNotRecorded { .. }
        )
    }

    pub fn response_message(&self) -> String {
        match self {
            Self::PaymentAmbiguous { idempotency_key }
            | Self::ChargedButNotRecorded {
                idempotency_key, ..
            } => format!("{} (reference {})", CONTACT_SUPPORT_MESSAGE, idempotency_key),
            Self::PaymentGatewayError(_) => {
                "Payment provider unavailable, please retry shortly".to_string()
            }
            Self::DatabaseError(_) => "Database error".to_string(),
            _ => self.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid quantity {0}: must be at least 1")]
    InvalidQuantity(i32),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Maps unique-index violations to `Conflict`, everything else to `DatabaseError`.
    pub fn from_db_conflict(err: DbErr, what: impl Into<String>) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(what.into()),
            _ => ServiceError::DatabaseError(err),
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidInput(_) | Self::InvalidQuantity(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::DatabaseError(_) | Self::EventError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Checkout(err) => err.status_code(),
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            Self::Checkout(err) => err.response_message(),
            _ => self.to_string(),
        }
    }

    fn code(&self) -> Option<String> {
        match self {
            Self::Checkout(err) => Some(err.code().to_string()),
            Self::InvalidQuantity(_) => Some("invalid_quantity".to_string()),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::new(status, self.response_message(), self.code());
        (status, Json(body)).into_response()
    }
}

/// API Error type for HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {message}")]
    BadRequest {
        message: String,
        error_code: Option<String>,
    },
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::ServiceError(ServiceError::Checkout(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::ServiceError(service_error) => service_error.into_response(),
            ApiError::ValidationError(msg) => {
                let body = ErrorResponse::new(StatusCode::BAD_REQUEST, msg, None);
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            ApiError::NotFound(msg) => {
                let body = ErrorResponse::new(StatusCode::NOT_FOUND, msg, None);
                (StatusCode::NOT_FOUND, Json(body)).into_response()
            }
            ApiError::Unauthorized(msg) => {
                let body = ErrorResponse::new(StatusCode::UNAUTHORIZED, msg, None);
                (StatusCode::UNAUTHORIZED, Json(body)).into_response()
            }
            ApiError::BadRequest {
                message,
                error_code,
            } => {
                let body = ErrorResponse::new(StatusCode::BAD_REQUEST, message, error_code);
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
        }
    }
}
