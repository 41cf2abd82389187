use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use super::extract::{Json, Path, Query};

use crate::{
    dto::envelope::ApiResponse,
    dto::question_bank_dto::{
        QuestionBankImportResponse, QuestionBankListQuery, UpdateQuestionBankPayload,
        UploadMetadata,
    },
    error::{Error, Result},
    AppState,
};

#[axum::debug_handler]
pub async fn list_question_banks(
    State(state): State<AppState>,
    Query(query): Query<QuestionBankListQuery>,
) -> Result<impl IntoResponse> {
    let page = state.question_bank_service.list(&query).await?;
    Ok(Json(ApiResponse::ok(page)))
}

#[axum::debug_handler]
pub async fn get_question_bank(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let bank = state.question_bank_service.get_by_id(id).await?;
    Ok(Json(ApiResponse::ok(bank)))
}

#[utoipa::path(
    post,
    path = "/api/v1/question-banks/upload",
    responses(
        (status = 201, description = "Upload accepted, import started", body = QuestionBankImportResponse),
        (status = 400, description = "Unsupported, oversized or malformed file"),
        (status = 404, description = "Subject not found")
    )
)]
#[axum::debug_handler]
pub async fn upload_question_bank(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut meta = UploadMetadata::default();
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => meta.name = field.text().await?.trim().to_string(),
            "description" => {
                let text = field.text().await?;
                meta.description = Some(text).filter(|d| !d.trim().is_empty());
            }
            "subject_id" => {
                let raw = field.text().await?;
                let id = raw
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| Error::BadRequest("subject_id must be an integer".into()))?;
                meta.subject_id = Some(id);
            }
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                upload = Some((file_name, data));
            }
            _ => {}
        }
    }

    let (file_name, data) =
        upload.ok_or_else(|| Error::BadRequest("A question bank file is required".into()))?;
    if meta.name.is_empty() {
        meta.name = std::path::Path::new(&file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
    }
    meta.validate()?;

    tracing::info!(file = %file_name, size = data.len(), "question bank upload received");
    let response = state
        .question_bank_service
        .upload(meta, &file_name, &data)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(response))))
}

#[axum::debug_handler]
pub async fn update_question_bank(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionBankPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let bank = state.question_bank_service.update(id, payload).await?;
    Ok(Json(ApiResponse::ok(bank)))
}

#[axum::debug_handler]
pub async fn delete_question_bank(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    state.question_bank_service.delete(id).await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "question_bank_id": id }),
        "Question bank deleted",
    )))
}

#[axum::debug_handler]
pub async fn reimport_question_bank(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let response = state.question_bank_service.reimport(id).await?;
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok(response))))
}
