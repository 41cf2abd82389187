use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;

use super::extract::Json;
use crate::dto::envelope::ApiResponse;

#[axum::debug_handler]
pub async fn health() -> impl IntoResponse {
    let body = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(ApiResponse::ok(body)))
}
