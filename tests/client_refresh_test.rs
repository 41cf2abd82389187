use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Form, Path, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use study_backend::client::resources::UploadQuestionBank;
use study_backend::client::{
    ApiClient, ClientConfig, ClientError, MemoryTokenStore, Notifier, TokenStore,
};
use study_backend::dto::auth_dto::{LoginForm, RefreshTokenPayload};
use study_backend::dto::envelope::ApiResponse;
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

const STALE_TOKEN: &str = "access-stale";
const FRESH_TOKEN: &str = "access-fresh";
const REFRESH_TOKEN: &str = "refresh-1";

#[derive(Default)]
struct MockBackend {
    requests: AtomicUsize,
    refresh_calls: AtomicUsize,
    refresh_fails: AtomicBool,
    reject_everything: AtomicBool,
    valid_token: Mutex<String>,
}

impl MockBackend {
    fn new() -> Arc<Self> {
        let backend = Self::default();
        *backend.valid_token.lock().unwrap() = FRESH_TOKEN.to_string();
        Arc::new(backend)
    }

    fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::<()>::error("unauthorized", message)),
    )
        .into_response()
}

async fn count_requests(
    State(backend): State<Arc<MockBackend>>,
    req: Request,
    next: Next,
) -> Response {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    next.run(req).await
}

async fn mock_subject(
    State(backend): State<Arc<MockBackend>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();
    let valid = backend.valid_token.lock().unwrap().clone();
    if backend.reject_everything.load(Ordering::SeqCst) || presented != valid {
        return unauthorized("Could not validate credentials");
    }
    Json(ApiResponse::ok(json!({
        "id": id,
        "name": "操作系统",
        "description": null,
        "created_at": Utc::now(),
        "updated_at": null,
    })))
    .into_response()
}

async fn mock_refresh(
    State(backend): State<Arc<MockBackend>>,
    Json(payload): Json<RefreshTokenPayload>,
) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(150)).await;
    if backend.refresh_fails.load(Ordering::SeqCst) || payload.refresh_token != REFRESH_TOKEN {
        return unauthorized("Invalid refresh token");
    }
    Json(ApiResponse::ok(json!({
        "access_token": FRESH_TOKEN,
        "refresh_token": REFRESH_TOKEN,
        "token_type": "bearer",
    })))
    .into_response()
}

async fn mock_login(Form(form): Form<LoginForm>) -> Response {
    if form.username == "alice" && form.password == "secret" {
        return Json(ApiResponse::ok(json!({
            "access_token": FRESH_TOKEN,
            "refresh_token": REFRESH_TOKEN,
            "token_type": "bearer",
        })))
        .into_response();
    }
    unauthorized("Incorrect username or password")
}

async fn spawn_backend(backend: Arc<MockBackend>) -> String {
    let app = Router::new()
        .route("/api/v1/subjects/:id", get(mock_subject))
        .route("/api/v1/auth/refresh", post(mock_refresh))
        .route("/api/v1/auth/login", post(mock_login))
        .layer(middleware::from_fn_with_state(backend.clone(), count_requests))
        .with_state(backend);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[derive(Default)]
struct RecordingNotifier {
    errors: Mutex<Vec<String>>,
    expired: AtomicUsize,
}

impl Notifier for RecordingNotifier {
    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn session_expired(&self) {
        self.expired.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    backend: Arc<MockBackend>,
    client: ApiClient,
    tokens: Arc<MemoryTokenStore>,
    notifier: Arc<RecordingNotifier>,
}

async fn harness() -> Harness {
    let backend = MockBackend::new();
    let base_url = spawn_backend(backend.clone()).await;
    let tokens = Arc::new(MemoryTokenStore::with_tokens(STALE_TOKEN, REFRESH_TOKEN));
    let notifier = Arc::new(RecordingNotifier::default());
    let client = ApiClient::new(
        ClientConfig::new(base_url).with_timeout(Duration::from_secs(5)),
        tokens.clone(),
        notifier.clone(),
    )
    .unwrap();
    Harness {
        backend,
        client,
        tokens,
        notifier,
    }
}

#[tokio::test]
async fn concurrent_unauthorized_requests_trigger_a_single_refresh() {
    let h = harness().await;

    let results = join_all((1..=6).map(|id| {
        let client = h.client.clone();
        async move { client.get_subject(id).await }
    }))
    .await;

    for (i, result) in results.into_iter().enumerate() {
        let subject = assert_ok!(result);
        assert_eq!(subject.id, i as i64 + 1);
    }
    assert_eq!(h.backend.refresh_calls(), 1);
    assert_eq!(h.tokens.access_token().as_deref(), Some(FRESH_TOKEN));
    assert!(h.notifier.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn spawned_requests_share_the_refresh() {
    let h = harness().await;

    let handles: Vec<_> = (1..=4)
        .map(|id| {
            let client = h.client.clone();
            tokio::spawn(async move { client.get_subject(id).await })
        })
        .collect();
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }
    assert_eq!(h.backend.refresh_calls(), 1);
}

#[tokio::test]
async fn failed_login_never_refreshes() {
    let h = harness().await;

    let err = assert_err!(h.client.login("alice", "wrong").await);
    assert!(matches!(err, ClientError::LoginFailed(ref msg) if msg.contains("Incorrect")));
    assert_eq!(h.backend.refresh_calls(), 0);
    assert_eq!(h.notifier.expired.load(Ordering::SeqCst), 0);
    // The previous session is left alone.
    assert_eq!(h.tokens.access_token().as_deref(), Some(STALE_TOKEN));
}

#[tokio::test]
async fn successful_login_stores_tokens() {
    let h = harness().await;
    h.tokens.clear().unwrap();

    let tokens = assert_ok!(h.client.login("alice", "secret").await);
    assert_eq!(tokens.token_type, "bearer");
    assert_eq!(h.tokens.access_token().as_deref(), Some(FRESH_TOKEN));
    assert_ok!(h.client.get_subject(1).await);
    assert_eq!(h.backend.refresh_calls(), 0);
}

#[tokio::test]
async fn retried_request_does_not_refresh_again() {
    let h = harness().await;
    h.backend.reject_everything.store(true, Ordering::SeqCst);

    let err = assert_err!(h.client.get_subject(1).await);
    assert_eq!(err, ClientError::SessionExpired);
    assert_eq!(h.backend.refresh_calls(), 1);
    // Original attempt, one refresh, one retry.
    assert_eq!(h.backend.requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn refresh_failure_rejects_all_waiters_and_clears_tokens() {
    let h = harness().await;
    h.backend.refresh_fails.store(true, Ordering::SeqCst);

    let results = join_all((1..=5).map(|id| {
        let client = h.client.clone();
        async move { client.get_subject(id).await }
    }))
    .await;

    for result in results {
        let err = assert_err!(result);
        assert!(err.is_session_error(), "unexpected error: {:?}", err);
    }
    assert_eq!(h.backend.refresh_calls(), 1);
    assert!(h.tokens.access_token().is_none());
    assert!(h.tokens.refresh_token().is_none());
    assert_eq!(h.notifier.expired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn request_after_refresh_uses_new_token_directly() {
    let h = harness().await;

    assert_ok!(h.client.get_subject(1).await);
    let before = h.backend.requests.load(Ordering::SeqCst);
    assert_ok!(h.client.get_subject(2).await);

    assert_eq!(h.backend.requests.load(Ordering::SeqCst), before + 1);
    assert_eq!(h.backend.refresh_calls(), 1);
}

#[tokio::test]
async fn unsupported_upload_makes_no_request() {
    let h = harness().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("questions.txt");
    std::fs::write(&path, "[]").unwrap();

    let meta = UploadQuestionBank {
        name: "bank".into(),
        description: None,
        subject_id: 1,
    };
    let err = assert_err!(h.client.upload_question_bank(&path, &meta).await);
    assert!(matches!(err, ClientError::UnsupportedFile(_)));
    assert_eq!(h.backend.requests.load(Ordering::SeqCst), 0);
    assert_eq!(h.notifier.errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn not_found_is_reported_without_retry() {
    let h = harness().await;
    h.tokens.set_tokens(FRESH_TOKEN, REFRESH_TOKEN).unwrap();

    let err = assert_err!(
        h.client
            .get_question_bank(1)
            .await
    );
    assert!(matches!(err, ClientError::NotFound(_)));
    assert_eq!(h.backend.requests.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.refresh_calls(), 0);
    assert_eq!(h.notifier.errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn explicit_refresh_joins_an_in_flight_refresh() {
    let h = harness().await;

    let (subject, refreshed) = tokio::join!(h.client.get_subject(3), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.client.refresh().await
    });

    assert_eq!(assert_ok!(subject).id, 3);
    assert_eq!(assert_ok!(refreshed), FRESH_TOKEN);
    assert_eq!(h.backend.refresh_calls(), 1);
}

#[tokio::test]
async fn explicit_refresh_without_refresh_token_expires_the_session() {
    let h = harness().await;
    h.tokens.clear().unwrap();

    let err = assert_err!(h.client.refresh().await);
    assert!(matches!(err, ClientError::RefreshFailed(_)));
    assert_eq!(h.backend.refresh_calls(), 0);
    assert_eq!(h.notifier.expired.load(Ordering::SeqCst), 1);
}
