use axum::{
    extract::{Path, State},
    routing::{get, patch},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::cart_item;
use crate::services::carts::NewCartItem;
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub title: String,
    pub image: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<cart_item::Model> for CartItemResponse {
    fn from(m: cart_item::Model) -> Self {
        let total = m
            .total
            .unwrap_or_else(|| m.unit_price * Decimal::from(m.quantity));
        Self {
            id: m.id,
            product_id: m.product_id,
            title: m.title,
            image: m.image,
            size: m.size,
            color: m.color,
            quantity: m.quantity,
            unit_price: m.unit_price,
            total,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddCartItemBody {
    pub product_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    pub unit_price: Decimal,
    pub base_price: Option<Decimal>,
    #[serde(default)]
    pub tax: Decimal,
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub discount: Decimal,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateQuantityBody {
    pub quantity: i32,
}

#[utoipa::path(
    get,
    path = "/api/v1/carts",
    summary = "Get my cart",
    responses(
        (status = 200, description = "Cart retrieved", body = ApiResponse<Vec<CartItemResponse>>)
    ),
    security(("Bearer" = []))
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<CartItemResponse>> {
    let lines = state.services.carts.get_cart(user.user_id).await?;
    Ok(Json(ApiResponse::success(
        lines.into_iter().map(CartItemResponse::from).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/carts",
    summary = "Add cart item",
    description = "Adds a line; an existing line for the same variant gets its quantity bumped.",
    request_body = AddCartItemBody,
    responses(
        (status = 200, description = "Item added", body = ApiResponse<CartItemResponse>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn add_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<AddCartItemBody>,
) -> ApiResult<CartItemResponse> {
    let line = state
        .services
        .carts
        .add_item(
            user.user_id,
            NewCartItem {
                product_id: body.product_id,
                title: body.title,
                description: body.description,
                image: body.image,
                size: body.size,
                color: body.color,
                quantity: body.quantity,
                unit_price: body.unit_price,
                base_price: body.base_price,
                tax: body.tax,
                shipping_cost: body.shipping_cost,
                discount: body.discount,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(line.into())))
}

#[utoipa::path(
    patch,
    path = "/api/v1/carts/{id}",
    summary = "Update cart item quantity",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    request_body = UpdateQuantityBody,
    responses(
        (status = 200, description = "Quantity updated", body = ApiResponse<CartItemResponse>),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateQuantityBody>,
) -> ApiResult<CartItemResponse> {
    let line = state
        .services
        .carts
        .update_quantity(user.user_id, id, body.quantity)
        .await?;
    Ok(Json(ApiResponse::success(line.into())))
}

#[utoipa::path(
    delete,
    path = "/api/v1/carts/{id}",
    summary = "Remove cart item",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    responses(
        (status = 200, description = "Item removed", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<serde_json::Value> {
    state.services.carts.remove_item(user.user_id, id).await?;
    Ok(Json(
        ApiResponse::success(serde_json::json!({ "id": id })).with_message("Cart item removed"),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/carts",
    summary = "Clear my cart",
    responses(
        (status = 200, description = "Cart cleared", body = ApiResponse<serde_json::Value>)
    ),
    security(("Bearer" = []))
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<serde_json::Value> {
    let removed = state.services.carts.clear_cart(user.user_id).await?;
    Ok(Json(
        ApiResponse::success(serde_json::json!({ "removed": removed }))
            .with_message("Cart cleared"),
    ))
}

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/carts", get(get_cart).post(add_cart_item).delete(clear_cart))
        .route("/carts/:id", patch(update_cart_item).delete(remove_cart_item))
}
