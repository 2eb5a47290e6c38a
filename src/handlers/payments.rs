use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct GatewayKeyResponse {
    pub key: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProviderOrderBody {
    /// Amount in minor units (e.g. paise).
    pub amount: i64,
    pub currency: Option<String>,
    pub receipt: Option<String>,
    #[serde(default)]
    pub notes: serde_json::Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProviderOrderResponse {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentBody {
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub razorpay_signature: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/key",
    summary = "Get gateway public key",
    responses(
        (status = 200, description = "Key retrieved", body = ApiResponse<GatewayKeyResponse>),
        (status = 500, description = "Gateway not configured", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn get_gateway_key(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<GatewayKeyResponse> {
    let key = state.services.gateway.key_id()?;
    Ok(Json(ApiResponse::success(GatewayKeyResponse { key })))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/provider-order",
    summary = "Create provider order",
    description = "Creates a gateway-side order to collect payment against.",
    request_body = CreateProviderOrderBody,
    responses(
        (status = 200, description = "Provider order created", body = ApiResponse<ProviderOrderResponse>),
        (status = 400, description = "Invalid amount", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway error", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn create_provider_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateProviderOrderBody>,
) -> ApiResult<ProviderOrderResponse> {
    let currency = body
        .currency
        .unwrap_or_else(|| state.config.default_currency.clone());
    let receipt = body
        .receipt
        .unwrap_or_else(|| format!("rcpt_{}", Utc::now().timestamp()));
    let notes = match body.notes {
        serde_json::Value::Null => serde_json::json!({ "user_id": user.user_id }),
        other => other,
    };

    let provider_order = state
        .services
        .gateway
        .create_provider_order(body.amount, &currency, &receipt, notes)
        .await?;
    Ok(Json(ApiResponse::success(ProviderOrderResponse {
        id: provider_order.id,
        amount: provider_order.amount,
        currency: provider_order.currency,
    })))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    summary = "Verify checkout signature",
    description = "Verifies the post-checkout signature over the provider order id and payment id.",
    request_body = VerifyPaymentBody,
    responses(
        (status = 200, description = "Payment verified", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Missing fields or invalid signature", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(body): Json<VerifyPaymentBody>,
) -> ApiResult<serde_json::Value> {
    let (order_id, payment_id, signature) = match (
        body.razorpay_order_id.as_deref(),
        body.razorpay_payment_id.as_deref(),
        body.razorpay_signature.as_deref(),
    ) {
        (Some(o), Some(p), Some(s)) if !o.is_empty() && !p.is_empty() && !s.is_empty() => {
            (o, p, s)
        }
        _ => {
            return Err(ServiceError::BadRequest(
                "Missing required fields".to_string(),
            ))
        }
    };

    if !state
        .services
        .gateway
        .verify_checkout_signature(order_id, payment_id, signature)?
    {
        return Err(ServiceError::BadRequest("Invalid signature".to_string()));
    }

    Ok(Json(
        ApiResponse::success(serde_json::json!({ "verified": true }))
            .with_message("Payment verified"),
    ))
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/payments/key", get(get_gateway_key))
        .route("/payments/provider-order", post(create_provider_order))
        .route("/payments/verify", post(verify_payment))
}
