//! Storefront API Library
//!
//! Order lifecycle and checkout engine: carts, checkout orchestration,
//! admin-driven fulfilment transitions, and payment gateway reconciliation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod rate_limiter;
pub mod services;

use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::services::carts::CartService;
use crate::services::checkout::CheckoutService;
use crate::services::notifications::{LogMailer, Mailer};
use crate::services::orders::OrderService;
use crate::services::payments::{
    PaymentGateway, PaymentWebhookService, RazorpayConfig, RazorpayGateway,
};

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

/// Aggregated service layer used by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: OrderService,
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub webhooks: Arc<PaymentWebhookService>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        config: &AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let gateway: Arc<dyn PaymentGateway> =
            Arc::new(RazorpayGateway::new(RazorpayConfig::from_app_config(config)));
        let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);

        Self {
            orders: OrderService::new(db.clone(), gateway.clone(), event_sender.clone()),
            carts: CartService::new(db.clone()),
            checkout: CheckoutService::new(db.clone(), mailer.clone(), event_sender.clone()),
            webhooks: Arc::new(PaymentWebhookService::new(
                db,
                gateway.clone(),
                mailer,
                event_sender,
            )),
            gateway,
        }
    }

    /// Test constructor with injectable gateway and mailer doubles.
    pub fn with_dependencies(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
        event_sender: events::EventSender,
    ) -> Self {
        Self {
            orders: OrderService::new(db.clone(), gateway.clone(), event_sender.clone()),
            carts: CartService::new(db.clone()),
            checkout: CheckoutService::new(db.clone(), mailer.clone(), event_sender.clone()),
            webhooks: Arc::new(PaymentWebhookService::new(
                db,
                gateway.clone(),
                mailer,
                event_sender,
            )),
            gateway,
        }
    }
}

/// Common query parameters for paginated list endpoints.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

/// Common response wrapper.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

/// Standard API result type for JSON responses.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Full v1 API surface. Auth is enforced per-handler by the [`auth::AuthUser`]
/// and [`auth::AdminUser`] extractors; the webhook route is signature-gated
/// instead.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(handlers::orders::order_routes())
        .merge(handlers::checkout::checkout_routes())
        .merge(handlers::carts::cart_routes())
        .merge(handlers::payments::payment_routes())
        .merge(handlers::payment_webhooks::webhook_routes())
        .nest("/admin", handlers::orders::admin_order_routes())
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        description = "Order lifecycle and checkout engine",
    ),
    paths(
        handlers::health::health_check,
        handlers::orders::list_my_orders,
        handlers::orders::get_my_order,
        handlers::orders::cancel_my_order,
        handlers::orders::list_all_orders,
        handlers::orders::verify_order,
        handlers::orders::pack_order,
        handlers::orders::ship_order,
        handlers::orders::deliver_order,
        handlers::orders::cancel_order_admin,
        handlers::orders::refund_order,
        handlers::orders::revert_order,
        handlers::orders::update_courier,
        handlers::orders::delete_order,
        handlers::orders::get_audit_trail,
        handlers::checkout::checkout,
        handlers::checkout::buy_selected,
        handlers::carts::get_cart,
        handlers::carts::add_cart_item,
        handlers::carts::update_cart_item,
        handlers::carts::remove_cart_item,
        handlers::carts::clear_cart,
        handlers::payments::get_gateway_key,
        handlers::payments::create_provider_order,
        handlers::payments::verify_payment,
        handlers::payment_webhooks::payment_webhook,
    ),
    components(schemas(
        errors::ErrorResponse,
        handlers::health::HealthStatus,
        handlers::orders::OrderResponse,
        handlers::orders::TransitionResponse,
        handlers::orders::CancelResponse,
        handlers::orders::AuditEntryResponse,
        handlers::orders::NotesRequest,
        handlers::orders::ShipRequest,
        handlers::orders::DeliverRequest,
        handlers::orders::CancelRequest,
        handlers::orders::RevertRequest,
        handlers::orders::CourierRequest,
        handlers::orders::RefundRequest,
        handlers::checkout::CheckoutBody,
        handlers::checkout::BuySelectedBody,
        handlers::checkout::CheckoutResponse,
        handlers::carts::CartItemResponse,
        handlers::carts::AddCartItemBody,
        handlers::carts::UpdateQuantityBody,
        handlers::payments::GatewayKeyResponse,
        handlers::payments::CreateProviderOrderBody,
        handlers::payments::ProviderOrderResponse,
        handlers::payments::VerifyPaymentBody,
        entities::order::OrderStatus,
        entities::order::DeliveryStatus,
        entities::order::PaymentState,
        entities::order::GatewayPaymentStatus,
    ))
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn success_response_carries_data() {
        let response = ApiResponse::success(42);
        assert!(response.success);
        assert_eq!(response.data, Some(42));
        assert!(response.message.is_none());
    }

    #[test]
    fn with_message_attaches_text() {
        let response = ApiResponse::success(()).with_message("Order verified successfully");
        assert_eq!(
            response.message.as_deref(),
            Some("Order verified successfully")
        );
    }

    #[test]
    fn error_response_has_no_data() {
        let response = ApiResponse::<()>::error("oops");
        assert!(!response.success);
        assert!(response.data.is_none());
    }
}
