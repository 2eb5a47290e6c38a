use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use bytes::Bytes;
use tracing::info;

use crate::errors::ServiceError;
use crate::{ApiResponse, ApiResult, AppState};

const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Gateway webhook receiver. Unauthenticated; trust comes from the HMAC
/// signature over the raw body.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    summary = "Payment gateway webhook",
    description = "Verifies the provider signature and reconciles payment state for the referenced order.",
    request_body = String,
    responses(
        (status = 200, description = "Webhook processed", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid or missing signature", body = crate::errors::ErrorResponse)
    )
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<serde_json::Value> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::BadRequest("Missing signature header".to_string()))?;

    let outcome = state.services.webhooks.process(&body, signature).await?;
    info!(outcome = ?outcome, "webhook processed");

    Ok(Json(
        ApiResponse::success(serde_json::json!({ "received": true }))
            .with_message(outcome.message()),
    ))
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/payments/webhook", post(payment_webhook))
}
