use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use super::extract::{Json, Path, Query};

use crate::{
    dto::envelope::ApiResponse,
    dto::question_dto::{
        AnswerResult, CreateQuestionPayload, MyAnswersQuery, QuestionForApp, QuestionListQuery,
        SubmitAnswerPayload, UpdateQuestionPayload,
    },
    error::Result,
    models::question::Question,
    utils::token::Claims,
    AppState,
};

#[axum::debug_handler]
pub async fn list_questions(
    State(state): State<AppState>,
    Query(query): Query<QuestionListQuery>,
) -> Result<impl IntoResponse> {
    let page = state.question_service.list(&query).await?;
    Ok(Json(ApiResponse::ok(page)))
}

#[axum::debug_handler]
pub async fn list_questions_for_app(
    State(state): State<AppState>,
    Query(query): Query<QuestionListQuery>,
) -> Result<impl IntoResponse> {
    let page = state
        .question_service
        .list(&query)
        .await?
        .map(QuestionForApp::from);
    Ok(Json(ApiResponse::ok(page)))
}

#[utoipa::path(
    post,
    path = "/api/v1/questions",
    request_body = CreateQuestionPayload,
    responses(
        (status = 201, description = "Question created", body = Question),
        (status = 404, description = "Subject or question bank not found")
    )
)]
#[axum::debug_handler]
pub async fn create_question(
    State(state): State<AppState>,
    Json(payload): Json<CreateQuestionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let question = state.question_service.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(question))))
}

#[axum::debug_handler]
pub async fn get_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let question = state.question_service.get_by_id(id).await?;
    Ok(Json(ApiResponse::ok(question)))
}

#[axum::debug_handler]
pub async fn update_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let question = state.question_service.update(id, payload).await?;
    Ok(Json(ApiResponse::ok(question)))
}

#[axum::debug_handler]
pub async fn delete_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    state.question_service.delete(id).await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "question_id": id }),
        "Question deleted",
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/questions/{id}/answer",
    params(
        ("id" = i64, Path, description = "Question ID")
    ),
    request_body = SubmitAnswerPayload,
    responses(
        (status = 200, description = "Answer graded", body = AnswerResult),
        (status = 404, description = "Question not found")
    )
)]
#[axum::debug_handler]
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitAnswerPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let result = state
        .question_service
        .submit_answer(claims.uid, id, payload)
        .await?;
    Ok(Json(ApiResponse::ok(result)))
}

#[axum::debug_handler]
pub async fn my_answers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MyAnswersQuery>,
) -> Result<impl IntoResponse> {
    let page = state.question_service.my_answers(claims.uid, &query).await?;
    Ok(Json(ApiResponse::ok(page)))
}
