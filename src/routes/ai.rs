use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use tokio::sync::mpsc;
use validator::Validate;

use super::extract::{Json, Path};

use crate::{
    dto::ai_dto::{
        ChatRequest, CreateStudyRecordPayload, ExplanationResponse, HintResponse, TtsRequest,
    },
    dto::envelope::ApiResponse,
    error::Result,
    utils::token::Claims,
    AppState,
};

const CHAT_BUFFER: usize = 32;

/// Streams the upstream answer as server-sent events, ending with `[DONE]`.
pub async fn chat_stream(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    request.validate()?;

    let (tx, rx) = mpsc::channel::<String>(CHAT_BUFFER);
    let service = state.ai_service.clone();
    let user_id = claims.uid;
    tokio::spawn(async move {
        service.run_chat(user_id, request, tx).await;
    });

    let events = stream::unfold(rx, |mut rx| async move {
        let data = rx.recv().await?;
        Some((Ok(Event::default().data(data)), rx))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[utoipa::path(
    post,
    path = "/api/v1/ai/explanation/{question_id}",
    params(
        ("question_id" = i64, Path, description = "Question ID")
    ),
    responses(
        (status = 200, description = "Explanation generated", body = ExplanationResponse),
        (status = 400, description = "Question not answered yet"),
        (status = 404, description = "Question not found")
    )
)]
#[axum::debug_handler]
pub async fn explanation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let explanation = state.ai_service.explanation(claims.uid, question_id).await?;
    Ok(Json(ApiResponse::ok(ExplanationResponse { explanation })))
}

#[axum::debug_handler]
pub async fn hint(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let hint = state.ai_service.hint(claims.uid, question_id).await?;
    Ok(Json(ApiResponse::ok(HintResponse { hint })))
}

#[axum::debug_handler]
pub async fn conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let conversations = state.ai_service.conversations(claims.uid).await?;
    Ok(Json(ApiResponse::ok(conversations)))
}

#[axum::debug_handler]
pub async fn create_study_record(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateStudyRecordPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let record = state
        .study_service
        .create_record(claims.uid, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(record))))
}

#[axum::debug_handler]
pub async fn study_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let stats = state.study_service.stats(claims.uid).await?;
    Ok(Json(ApiResponse::ok(stats)))
}

#[axum::debug_handler]
pub async fn text_to_speech(
    State(state): State<AppState>,
    Json(request): Json<TtsRequest>,
) -> Result<impl IntoResponse> {
    let audio = state.tts_service.synthesize(&request).await?;
    Ok(Json(ApiResponse::ok(audio)))
}
