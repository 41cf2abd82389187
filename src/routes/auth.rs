use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use super::extract::{Form, Json};

use crate::{
    dto::auth_dto::{LoginForm, RefreshTokenPayload, RegisterPayload, TokenResponse, UserResponse},
    dto::envelope::ApiResponse,
    error::Result,
    utils::token::Claims,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterPayload,
    responses(
        (status = 201, description = "User registered", body = UserResponse),
        (status = 400, description = "Invalid payload or username/email taken")
    )
)]
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let user = state.auth_service.register(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(UserResponse::from(user))),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    responses(
        (status = 200, description = "Token pair issued", body = TokenResponse),
        (status = 400, description = "Inactive user"),
        (status = 401, description = "Incorrect username or password")
    )
)]
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse> {
    let tokens = state
        .auth_service
        .login(form.username.trim(), &form.password)
        .await?;
    Ok(Json(ApiResponse::ok(tokens)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshTokenPayload,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 401, description = "Invalid refresh token")
    )
)]
#[axum::debug_handler]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenPayload>,
) -> Result<impl IntoResponse> {
    let tokens = state.auth_service.refresh(&payload.refresh_token).await?;
    Ok(Json(ApiResponse::ok(tokens)))
}

#[axum::debug_handler]
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let user = state.auth_service.get_active_user(claims.uid).await?;
    Ok(Json(ApiResponse::ok(UserResponse::from(user))))
}
