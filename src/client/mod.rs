//! HTTP client for the study backend.
//!
//! Every call carries the stored access token. A 401 goes through the
//! [`RefreshCoordinator`]: at most one refresh is in flight per session and
//! requests that failed meanwhile wait for it and are retried once. Other
//! failures are classified, reported through the [`Notifier`] and returned.

pub mod error;
pub mod notify;
pub mod refresh;
pub mod resources;
pub mod token_store;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::dto::auth_dto::{RefreshTokenPayload, TokenResponse};
use crate::dto::envelope::ApiResponse;

pub use error::{ClientError, ClientResult};
pub use notify::{Notifier, TracingNotifier};
pub use refresh::RefreshCoordinator;
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};

pub const API_PREFIX: &str = "/api/v1";
pub const LOGIN_PATH: &str = "/api/v1/auth/login";
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct UploadFile {
    pub file_name: String,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub(crate) enum RequestBody {
    Empty,
    Json(JsonValue),
    Form(Vec<(String, String)>),
    Multipart {
        fields: Vec<(String, String)>,
        file: UploadFile,
    },
}

/// A request that can be sent again after a token refresh.
#[derive(Debug, Clone)]
pub(crate) struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: RequestBody,
    retried: bool,
}

impl ApiRequest {
    pub(crate) fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            retried: false,
        }
    }

    pub(crate) fn query(mut self, key: &str, value: Option<impl ToString>) -> Self {
        if let Some(value) = value {
            self.query.push((key.to_string(), value.to_string()));
        }
        self
    }

    pub(crate) fn json(mut self, body: JsonValue) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub(crate) fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(fields);
        self
    }

    pub(crate) fn multipart(mut self, fields: Vec<(String, String)>, file: UploadFile) -> Self {
        self.body = RequestBody::Multipart { fields, file };
        self
    }

    fn is_login(&self) -> bool {
        self.path == LOGIN_PATH
    }
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
    coordinator: RefreshCoordinator,
}

/// One authenticated session against the backend. Clones share the session.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
    ) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::from_reqwest)?;
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: config.base_url,
                tokens,
                notifier,
                coordinator: RefreshCoordinator::new(),
            }),
        })
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.inner.tokens
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.tokens.access_token().is_some()
    }

    /// Sends `request` and decodes the envelope's `data`.
    pub(crate) async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> ClientResult<T> {
        let result = match self.send(request).await {
            Ok(response) => decode_envelope(response).await,
            Err(e) => Err(e),
        };
        self.report(result)
    }

    /// Sends `request` and returns the raw body text.
    pub(crate) async fn execute_text(&self, request: ApiRequest) -> ClientResult<String> {
        let result = match self.send(request).await {
            Ok(response) => response.text().await.map_err(ClientError::from_reqwest),
            Err(e) => Err(e),
        };
        self.report(result)
    }

    pub(crate) fn report<T>(&self, result: ClientResult<T>) -> ClientResult<T> {
        if let Err(e) = &result {
            // Refresh failures already went through `session_expired`.
            if !matches!(e, ClientError::RefreshFailed(_)) {
                self.inner.notifier.error(&e.notice());
            }
        }
        result
    }

    async fn send(&self, mut request: ApiRequest) -> ClientResult<Response> {
        let mut token = self.inner.tokens.access_token();
        loop {
            let response = self.send_once(&request, token.as_deref()).await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let message = error_message(response).await;
            if status != StatusCode::UNAUTHORIZED {
                return Err(ClientError::from_status(status, message));
            }
            let next = self
                .token_after_unauthorized(&mut request, token.as_deref(), message)
                .await?;
            token = Some(next);
        }
    }

    async fn token_after_unauthorized(
        &self,
        request: &mut ApiRequest,
        sent_with: Option<&str>,
        message: String,
    ) -> ClientResult<String> {
        if request.is_login() {
            return Err(ClientError::LoginFailed(message));
        }
        if request.retried {
            tracing::debug!(path = %request.path, "retried request rejected again");
            return Err(ClientError::SessionExpired);
        }
        request.retried = true;

        self.inner
            .coordinator
            .token_after_unauthorized(self.inner.tokens.as_ref(), sent_with, || {
                self.refresh_session()
            })
            .await
    }

    /// Exchanges the stored refresh token for a new pair. On failure the
    /// session is cleared and the notifier is told it expired.
    async fn refresh_session(&self) -> ClientResult<String> {
        match self.request_new_tokens().await {
            Ok(tokens) => {
                self.inner
                    .tokens
                    .set_tokens(&tokens.access_token, &tokens.refresh_token)?;
                tracing::debug!("access token refreshed");
                Ok(tokens.access_token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed, clearing session");
                if let Err(clear_err) = self.inner.tokens.clear() {
                    tracing::error!(error = %clear_err, "could not clear token store");
                }
                self.inner.notifier.session_expired();
                Err(e)
            }
        }
    }

    async fn request_new_tokens(&self) -> ClientResult<TokenResponse> {
        let refresh_token = self
            .inner
            .tokens
            .refresh_token()
            .ok_or_else(|| ClientError::RefreshFailed("no refresh token stored".to_string()))?;

        let payload = RefreshTokenPayload { refresh_token };
        let response = self
            .inner
            .http
            .post(format!("{}{}", self.inner.base_url, REFRESH_PATH))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ClientError::RefreshFailed(ClientError::from_reqwest(e).to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = error_message(response).await;
            return Err(ClientError::RefreshFailed(format!("{}: {}", status, message)));
        }
        decode_envelope(response)
            .await
            .map_err(|e| ClientError::RefreshFailed(e.to_string()))
    }

    async fn send_once(&self, request: &ApiRequest, token: Option<&str>) -> ClientResult<Response> {
        let url = format!("{}{}", self.inner.base_url, request.path);
        let mut builder = self.inner.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Multipart { fields, file } => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                let part = reqwest::multipart::Part::bytes(file.data.to_vec())
                    .file_name(file.file_name.clone())
                    .mime_str("application/json")
                    .map_err(ClientError::from_reqwest)?;
                builder.multipart(form.part("file", part))
            }
        };
        builder.send().await.map_err(ClientError::from_reqwest)
    }
}

async fn decode_envelope<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let bytes = response.bytes().await.map_err(ClientError::from_reqwest)?;
    let envelope: ApiResponse<T> =
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))?;
    envelope
        .data
        .ok_or_else(|| ClientError::Decode("response envelope has no data".to_string()))
}

/// Best-effort human message of an error response.
async fn error_message(response: Response) -> String {
    let status = response.status();
    let bytes = response.bytes().await.unwrap_or_default();
    serde_json::from_slice::<ApiResponse<JsonValue>>(&bytes)
        .ok()
        .and_then(|envelope| envelope.message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}
