use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db;
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: &'static str,
    pub version: &'static str,
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    summary = "Health check",
    responses(
        (status = 200, description = "Service healthy", body = ApiResponse<HealthStatus>)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> ApiResult<HealthStatus> {
    let database = match db::check_connection(&state.db).await {
        Ok(()) => "up",
        Err(_) => "down",
    };

    Ok(Json(ApiResponse::success(HealthStatus {
        status: "ok",
        database,
        version: env!("CARGO_PKG_VERSION"),
    })))
}
