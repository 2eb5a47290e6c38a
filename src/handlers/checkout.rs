use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::checkout::{CheckoutRequest, CheckoutSource, ShippingAddress};
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    /// Checkout a single cart line instead of the whole cart.
    pub single_cart_id: Option<Uuid>,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    /// Gateway payment id for prepaid checkouts.
    pub payment_id: Option<String>,
    /// Gateway order id; doubles as the idempotency key when no batch id
    /// is supplied.
    pub razorpay_order_id: Option<String>,
    pub batch_id: Option<String>,
    #[schema(value_type = Object)]
    pub address: ShippingAddress,
    pub notes: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuySelectedBody {
    #[serde(default)]
    pub cart_ids: Vec<Uuid>,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    pub payment_id: Option<String>,
    pub razorpay_order_id: Option<String>,
    pub batch_id: Option<String>,
    #[schema(value_type = Object)]
    pub address: ShippingAddress,
    pub notes: Option<String>,
    pub currency: Option<String>,
}

fn default_payment_method() -> String {
    "cod".to_string()
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    /// Present when the checkout produced exactly one order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    pub order_ids: Vec<Uuid>,
    pub already_existed: bool,
}

fn checkout_response(
    outcome: crate::services::checkout::CheckoutOutcome,
) -> ApiResponse<CheckoutResponse> {
    let order_ids: Vec<Uuid> = outcome.orders.iter().map(|o| o.id).collect();
    ApiResponse::success(CheckoutResponse {
        order_id: (order_ids.len() == 1).then(|| order_ids[0]),
        order_ids,
        already_existed: outcome.already_existed,
    })
    .with_message(outcome.message)
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/checkout",
    summary = "Checkout",
    description = "Converts the cart (or one line of it) into orders. Idempotent on batch id and gateway payment id.",
    request_body = CheckoutBody,
    responses(
        (status = 200, description = "Orders placed", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "Empty cart or invalid address", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CheckoutBody>,
) -> ApiResult<CheckoutResponse> {
    let source = match body.single_cart_id {
        Some(cart_id) => CheckoutSource::SingleLine(cart_id),
        None => CheckoutSource::WholeCart,
    };
    let outcome = state
        .services
        .checkout
        .checkout(
            user.user_id,
            CheckoutRequest {
                source,
                payment_method: body.payment_method,
                payment_transaction_id: body.payment_id,
                provider_order_id: body.razorpay_order_id,
                batch_id: body.batch_id,
                shipping_address: body.address,
                customer_notes: body.notes,
                currency: body
                    .currency
                    .unwrap_or_else(|| state.config.default_currency.clone()),
            },
        )
        .await?;
    Ok(Json(checkout_response(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/buy-selected",
    summary = "Buy selected cart lines",
    description = "Places one order per selected cart line.",
    request_body = BuySelectedBody,
    responses(
        (status = 200, description = "Orders placed", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "No cart ids supplied", body = crate::errors::ErrorResponse),
        (status = 404, description = "No cart items found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn buy_selected(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<BuySelectedBody>,
) -> ApiResult<CheckoutResponse> {
    if body.cart_ids.is_empty() {
        return Err(ServiceError::Validation(
            "cartIds array is required".to_string(),
        ));
    }
    let outcome = state
        .services
        .checkout
        .checkout(
            user.user_id,
            CheckoutRequest {
                source: CheckoutSource::SelectedLines(body.cart_ids),
                payment_method: body.payment_method,
                payment_transaction_id: body.payment_id,
                provider_order_id: body.razorpay_order_id,
                batch_id: body.batch_id,
                shipping_address: body.address,
                customer_notes: body.notes,
                currency: body
                    .currency
                    .unwrap_or_else(|| state.config.default_currency.clone()),
            },
        )
        .await?;
    Ok(Json(checkout_response(outcome)))
}

pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/orders/checkout", post(checkout))
        .route("/orders/buy-selected", post(buy_selected))
}
