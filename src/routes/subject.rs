use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use super::extract::{Json, Path};

use crate::{
    dto::envelope::ApiResponse,
    dto::subject_dto::{CreateSubjectPayload, SubjectDeleteResponse, UpdateSubjectPayload},
    error::Result,
    models::subject::Subject,
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/subjects",
    responses(
        (status = 200, description = "All subjects", body = [Subject])
    )
)]
#[axum::debug_handler]
pub async fn list_subjects(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let subjects = state.subject_service.list().await?;
    Ok(Json(ApiResponse::ok(subjects)))
}

#[axum::debug_handler]
pub async fn get_subject(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let subject = state.subject_service.get_by_id(id).await?;
    Ok(Json(ApiResponse::ok(subject)))
}

#[utoipa::path(
    post,
    path = "/api/v1/subjects",
    request_body = CreateSubjectPayload,
    responses(
        (status = 201, description = "Subject created", body = Subject),
        (status = 400, description = "Invalid payload")
    )
)]
#[axum::debug_handler]
pub async fn create_subject(
    State(state): State<AppState>,
    Json(payload): Json<CreateSubjectPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let subject = state.subject_service.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(subject))))
}

#[axum::debug_handler]
pub async fn update_subject(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateSubjectPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let subject = state.subject_service.update(id, payload).await?;
    Ok(Json(ApiResponse::ok(subject)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/subjects/{id}",
    params(
        ("id" = i64, Path, description = "Subject ID")
    ),
    responses(
        (status = 200, description = "Subject and its content deleted", body = SubjectDeleteResponse),
        (status = 404, description = "Subject not found")
    )
)]
#[axum::debug_handler]
pub async fn delete_subject(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let summary = state.subject_service.delete_cascade(id).await?;
    let message = format!(
        "Deleted subject with {} questions and {} question banks",
        summary.deleted_questions, summary.deleted_question_banks
    );
    Ok(Json(ApiResponse::with_message(summary, message)))
}
