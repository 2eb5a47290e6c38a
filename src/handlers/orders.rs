use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{AdminUser, AuthUser};
use crate::entities::order;
use crate::entities::order_audit;
use crate::services::orders::{
    CancelActor, CancelParams, CourierUpdate, DeliverParams, ShipDetails,
};
use crate::{ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

/// Public projection of an order row.
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub status: order::OrderStatus,
    pub delivery_status: order::DeliveryStatus,
    pub payment_status: order::PaymentState,
    pub total_amount: Decimal,
    pub currency: String,
    pub shipping_address: String,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub carrier_url: Option<String>,
    pub courier_phone: Option<String>,
    pub courier_logo_url: Option<String>,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub packed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub customer_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<order::Model> for OrderResponse {
    fn from(m: order::Model) -> Self {
        Self {
            id: m.id,
            order_number: m.order_number,
            status: m.status,
            delivery_status: m.delivery_status,
            payment_status: m.payment_status,
            total_amount: m.total_amount,
            currency: m.currency,
            shipping_address: m.shipping_address,
            tracking_number: m.tracking_number,
            carrier: m.carrier,
            carrier_url: m.carrier_url,
            courier_phone: m.courier_phone,
            courier_logo_url: m.courier_logo_url,
            expected_delivery_date: m.expected_delivery_date,
            is_verified: m.is_verified,
            verified_at: m.verified_at,
            packed_at: m.packed_at,
            shipped_at: m.shipped_at,
            delivered_at: m.delivered_at,
            cancelled_at: m.cancelled_at,
            cancel_reason: m.cancel_reason,
            customer_notes: m.customer_notes,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// Transition result: the updated order plus the suggested next admin step.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransitionResponse {
    pub order: OrderResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelResponse {
    pub order: OrderResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_id: Option<String>,
    pub refund_initiated: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditEntryResponse {
    pub id: Uuid,
    pub action: order_audit::AuditAction,
    pub actor_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
    pub meta: serde_json::Value,
}

impl From<order_audit::Model> for AuditEntryResponse {
    fn from(m: order_audit::Model) -> Self {
        Self {
            id: m.id,
            action: m.action,
            actor_id: m.actor_id,
            recorded_at: m.recorded_at,
            meta: m.meta,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotesRequest {
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShipRequest {
    pub tracking_number: Option<String>,
    /// Courier company name.
    pub carrier: Option<String>,
    pub carrier_url: Option<String>,
    pub courier_phone: Option<String>,
    pub courier_logo_url: Option<String>,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliverRequest {
    pub delivery_proof: Option<String>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: String,
    pub admin_notes: Option<String>,
    /// Admin-only partial refund amount, in currency units.
    pub refund_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevertRequest {
    pub reason: Option<String>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CourierRequest {
    pub carrier: Option<String>,
    pub carrier_url: Option<String>,
    pub courier_phone: Option<String>,
    pub courier_logo_url: Option<String>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    /// Partial refund amount in currency units; full refund when absent.
    pub amount: Option<Decimal>,
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List my orders",
    description = "Orders belonging to the authenticated customer, newest first",
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<Vec<OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<OrderResponse>> {
    let orders = state.services.orders.get_user_orders(user.user_id).await?;
    let orders = orders.into_iter().map(OrderResponse::from).collect();
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get my order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn get_my_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderResponse> {
    let order = state
        .services
        .orders
        .get_user_order(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(order.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    summary = "Cancel my order",
    description = "Customer cancellation; blocked once the order has shipped. Paid orders are refunded first.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<CancelResponse>),
        (status = 409, description = "Order not cancellable", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn cancel_my_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelRequest>,
) -> ApiResult<CancelResponse> {
    let outcome = state
        .services
        .orders
        .cancel_order(
            id,
            CancelActor::Customer(user.user_id),
            CancelParams {
                reason: body.reason,
                admin_notes: None,
                refund_amount: None,
            },
        )
        .await?;
    Ok(Json(
        ApiResponse::success(CancelResponse {
            order: outcome.order.into(),
            refund_id: outcome.refund_id,
            refund_initiated: outcome.refund_initiated,
        })
        .with_message("Order cancelled successfully."),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    summary = "List all orders",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)")
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<PaginatedResponse<OrderResponse>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<OrderResponse>> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);
    let (orders, total) = state.services.orders.list_orders(page - 1, limit).await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: orders.into_iter().map(OrderResponse::from).collect(),
        total,
        page,
        limit,
        total_pages: total.div_ceil(limit),
    })))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/orders/{id}/verify",
    summary = "Verify order",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = NotesRequest,
    responses(
        (status = 200, description = "Order verified", body = ApiResponse<TransitionResponse>),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn verify_order(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<NotesRequest>,
) -> ApiResult<TransitionResponse> {
    let outcome = state
        .services
        .orders
        .verify_order(id, admin.0.user_id, body.admin_notes)
        .await?;
    Ok(Json(transition_response(outcome)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/orders/{id}/pack",
    summary = "Pack order",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = NotesRequest,
    responses(
        (status = 200, description = "Order packed", body = ApiResponse<TransitionResponse>),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn pack_order(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<NotesRequest>,
) -> ApiResult<TransitionResponse> {
    let outcome = state
        .services
        .orders
        .pack_order(id, admin.0.user_id, body.admin_notes)
        .await?;
    Ok(Json(transition_response(outcome)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/orders/{id}/ship",
    summary = "Ship order",
    description = "Marks the order in transit. Tracking number and carrier are required.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ShipRequest,
    responses(
        (status = 200, description = "Order shipped", body = ApiResponse<TransitionResponse>),
        (status = 400, description = "Missing shipping details", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn ship_order(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ShipRequest>,
) -> ApiResult<TransitionResponse> {
    let outcome = state
        .services
        .orders
        .ship_order(
            id,
            admin.0.user_id,
            ShipDetails {
                tracking_number: body.tracking_number,
                carrier: body.carrier,
                carrier_url: body.carrier_url,
                courier_phone: body.courier_phone,
                courier_logo_url: body.courier_logo_url,
                expected_delivery_date: body.expected_delivery_date,
                admin_notes: body.admin_notes,
            },
        )
        .await?;
    Ok(Json(transition_response(outcome)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/orders/{id}/deliver",
    summary = "Mark order delivered",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = DeliverRequest,
    responses(
        (status = 200, description = "Order delivered", body = ApiResponse<TransitionResponse>),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn deliver_order(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<DeliverRequest>,
) -> ApiResult<TransitionResponse> {
    let outcome = state
        .services
        .orders
        .deliver_order(
            id,
            admin.0.user_id,
            DeliverParams {
                delivery_proof: body.delivery_proof,
                admin_notes: body.admin_notes,
            },
        )
        .await?;
    Ok(Json(transition_response(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/cancel",
    summary = "Cancel order (admin)",
    description = "Admin cancellation; allowed up to delivery. Paid orders are refunded first.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<CancelResponse>),
        (status = 409, description = "Order not cancellable", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn cancel_order_admin(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelRequest>,
) -> ApiResult<CancelResponse> {
    let outcome = state
        .services
        .orders
        .cancel_order(
            id,
            CancelActor::Admin(admin.0.user_id),
            CancelParams {
                reason: body.reason,
                admin_notes: body.admin_notes,
                refund_amount: body.refund_amount,
            },
        )
        .await?;
    Ok(Json(
        ApiResponse::success(CancelResponse {
            order: outcome.order.into(),
            refund_id: outcome.refund_id,
            refund_initiated: outcome.refund_initiated,
        })
        .with_message("Order cancelled successfully."),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/refund",
    summary = "Refund order",
    description = "Refunds the payment (fully or partially) and cancels the order.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund issued", body = ApiResponse<CancelResponse>),
        (status = 502, description = "Gateway error", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn refund_order(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<RefundRequest>,
) -> ApiResult<CancelResponse> {
    let outcome = state
        .services
        .orders
        .refund_order(id, admin.0.user_id, body.amount)
        .await?;
    let message = if outcome.refund_initiated {
        "Refund initiated"
    } else {
        "Payment already fully refunded"
    };
    Ok(Json(
        ApiResponse::success(CancelResponse {
            order: outcome.order.into(),
            refund_id: outcome.refund_id,
            refund_initiated: outcome.refund_initiated,
        })
        .with_message(message),
    ))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/orders/{id}/revert",
    summary = "Revert order status",
    description = "Steps the order back exactly one lifecycle stage and clears the reverted milestone.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = RevertRequest,
    responses(
        (status = 200, description = "Order reverted", body = ApiResponse<TransitionResponse>),
        (status = 409, description = "Nothing to revert", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn revert_order(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<RevertRequest>,
) -> ApiResult<TransitionResponse> {
    let outcome = state
        .services
        .orders
        .revert_order(id, admin.0.user_id, body.reason, body.admin_notes)
        .await?;
    Ok(Json(transition_response(outcome)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/orders/{id}/courier",
    summary = "Update courier details",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CourierRequest,
    responses(
        (status = 200, description = "Courier info updated", body = ApiResponse<TransitionResponse>),
        (status = 400, description = "Invalid courier details", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn update_courier(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<CourierRequest>,
) -> ApiResult<TransitionResponse> {
    let outcome = state
        .services
        .orders
        .update_courier(
            id,
            admin.0.user_id,
            CourierUpdate {
                carrier: body.carrier,
                carrier_url: body.carrier_url,
                courier_phone: body.courier_phone,
                courier_logo_url: body.courier_logo_url,
                admin_notes: body.admin_notes,
            },
        )
        .await?;
    Ok(Json(transition_response(outcome)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/orders/{id}",
    summary = "Delete order",
    description = "Soft delete; the row is retained for audit but excluded from queries.",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order deleted", body = ApiResponse<serde_json::Value>),
        (status = 409, description = "Order already deleted", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn delete_order(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<serde_json::Value> {
    state
        .services
        .orders
        .soft_delete_order(id, admin.0.user_id)
        .await?;
    Ok(Json(
        ApiResponse::success(serde_json::json!({ "id": id })).with_message("Order deleted"),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders/{id}/audit",
    summary = "Order audit trail",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Audit entries retrieved", body = ApiResponse<Vec<AuditEntryResponse>>)
    ),
    security(("Bearer" = []))
)]
pub async fn get_audit_trail(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<AuditEntryResponse>> {
    let entries = state.services.orders.get_audit_trail(id).await?;
    let entries = entries.into_iter().map(AuditEntryResponse::from).collect();
    Ok(Json(ApiResponse::success(entries)))
}

fn transition_response(
    outcome: crate::services::orders::TransitionOutcome,
) -> ApiResponse<TransitionResponse> {
    let message = outcome.message;
    ApiResponse::success(TransitionResponse {
        order: outcome.order.into(),
        next_action: outcome.next_action.map(str::to_string),
    })
    .with_message(message)
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_my_orders))
        .route("/orders/:id", get(get_my_order))
        .route("/orders/:id/cancel", post(cancel_my_order))
}

pub fn admin_order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_all_orders))
        .route("/orders/:id", delete(delete_order))
        .route("/orders/:id/verify", patch(verify_order))
        .route("/orders/:id/pack", patch(pack_order))
        .route("/orders/:id/ship", patch(ship_order))
        .route("/orders/:id/deliver", patch(deliver_order))
        .route("/orders/:id/revert", patch(revert_order))
        .route("/orders/:id/courier", patch(update_courier))
        .route("/orders/:id/cancel", post(cancel_order_admin))
        .route("/orders/:id/refund", post(refund_order))
        .route("/orders/:id/audit", get(get_audit_trail))
}
