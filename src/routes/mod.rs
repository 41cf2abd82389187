pub mod admin;
pub mod ai;
pub mod auth;
pub mod extract;
pub mod health;
pub mod question;
pub mod question_bank;
pub mod subject;

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    auth::{require_admin, require_bearer_auth},
    rate_limit::{rps_middleware, RateLimiter},
};
use crate::AppState;

const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Assembles the full HTTP surface: `/health` plus everything under `/api/v1`.
pub fn build_router(state: AppState) -> Router {
    let auth = from_fn_with_state(state.clone(), require_bearer_auth);
    let upload_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    let subjects = get(subject::list_subjects)
        .merge(post(subject::create_subject).route_layer(auth.clone()));
    let question_banks = get(question_bank::list_question_banks);
    let questions = get(question::list_questions).post(question::create_question);

    // Collection paths answer with and without a trailing slash.
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/subjects", subjects.clone())
        .route("/subjects/", subjects);

    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .route(
            "/subjects/:id",
            get(subject::get_subject)
                .put(subject::update_subject)
                .delete(subject::delete_subject),
        )
        .route("/question-banks", question_banks.clone())
        .route("/question-banks/", question_banks)
        .route(
            "/question-banks/upload",
            post(question_bank::upload_question_bank).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/question-banks/:id",
            get(question_bank::get_question_bank)
                .put(question_bank::update_question_bank)
                .delete(question_bank::delete_question_bank),
        )
        .route(
            "/question-banks/:id/reimport",
            post(question_bank::reimport_question_bank),
        )
        .route("/questions", questions.clone())
        .route("/questions/", questions)
        .route("/questions/for-app", get(question::list_questions_for_app))
        .route("/questions/my-answers", get(question::my_answers))
        .route(
            "/questions/:id",
            get(question::get_question)
                .put(question::update_question)
                .delete(question::delete_question),
        )
        .route("/questions/:id/answer", post(question::submit_answer))
        .route("/ai/chat/stream", post(ai::chat_stream))
        .route("/ai/explanation/:question_id", post(ai::explanation))
        .route("/ai/hint/:question_id", post(ai::hint))
        .route("/ai/conversations", get(ai::conversations))
        .route("/ai/study-records", post(ai::create_study_record))
        .route("/ai/study-stats", get(ai::study_stats))
        .route("/ai/tts", post(ai::text_to_speech))
        .route_layer(auth.clone());

    let admin = Router::new()
        .route("/admin/status", get(admin::system_status))
        .route("/admin/stats/overview", get(admin::overview_stats))
        .route_layer(from_fn(require_admin))
        .route_layer(auth);

    let api = public
        .merge(protected)
        .merge(admin)
        .layer(from_fn_with_state(
            RateLimiter::new(state.config.api_rps),
            rps_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
