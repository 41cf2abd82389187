use axum::{extract::State, response::IntoResponse};

use super::extract::Json;
use crate::{dto::envelope::ApiResponse, error::Result, AppState};

#[axum::debug_handler]
pub async fn system_status(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let status = state.admin_service.status().await;
    Ok(Json(ApiResponse::ok(status)))
}

#[axum::debug_handler]
pub async fn overview_stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let stats = state.admin_service.overview().await?;
    Ok(Json(ApiResponse::ok(stats)))
}
