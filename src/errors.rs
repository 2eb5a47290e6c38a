use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Standard error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A state-machine precondition was violated. Carries the specific
    /// human-readable reason, never surfaced as a generic failure.
    #[error("{0}")]
    InvalidTransition(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Actor lacks the required role or ownership. The message never leaks
    /// whether the resource exists.
    #[error("Access denied")]
    Forbidden,

    #[error("Payment gateway not configured: {0}")]
    GatewayConfig(String),

    #[error("Payment gateway request failed: {0}")]
    GatewayRequest(String),

    #[error("Invalid webhook signature")]
    WebhookSignature,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) | Self::EmptyCart | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::GatewayConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::GatewayRequest(_) => StatusCode::BAD_GATEWAY,
            Self::WebhookSignature => StatusCode::BAD_REQUEST,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Message suitable for HTTP responses. Internal failures return generic
    /// text to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::Database(_) => "Database error".to_string(),
            Self::Internal(_) | Self::Other(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_carries_specific_reason() {
        let err = ServiceError::InvalidTransition("Order must be verified before packing".into());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            err.response_message(),
            "Order must be verified before packing"
        );
    }

    #[test]
    fn database_errors_are_not_leaked() {
        let err = ServiceError::Database(sea_orm::DbErr::Custom("connection refused".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.response_message(), "Database error");
    }

    #[test]
    fn webhook_signature_fails_closed_with_400() {
        assert_eq!(
            ServiceError::WebhookSignature.status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
