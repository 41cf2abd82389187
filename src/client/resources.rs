use std::path::Path;

use bytes::Bytes;
use reqwest::Method;
use serde_json::{json, Value as JsonValue};

use super::{ApiClient, ApiRequest, ClientError, ClientResult, UploadFile, API_PREFIX, LOGIN_PATH};
use crate::dto::ai_dto::ConversationType;
use crate::dto::auth_dto::{TokenResponse, UserResponse};
use crate::dto::envelope::Page;
use crate::dto::question_bank_dto::{
    QuestionBankImportResponse, QuestionBankListQuery, UpdateQuestionBankPayload,
};
use crate::dto::question_dto::{
    AnswerResult, CreateQuestionPayload, QuestionListQuery, SubmitAnswerPayload,
    UpdateQuestionPayload,
};
use crate::dto::subject_dto::{CreateSubjectPayload, SubjectDeleteResponse, UpdateSubjectPayload};
use crate::models::question::Question;
use crate::models::question_bank::QuestionBank;
use crate::models::subject::Subject;

pub const ALLOWED_UPLOAD_EXTENSIONS: [&str; 1] = ["json"];

fn api(path: &str) -> String {
    format!("{}{}", API_PREFIX, path)
}

fn to_json<T: serde::Serialize>(value: &T) -> ClientResult<JsonValue> {
    serde_json::to_value(value).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Rejects files the backend would refuse, so no request is made for them.
pub fn check_upload_file_name(file_name: &str) -> ClientResult<()> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if ALLOWED_UPLOAD_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(ClientError::UnsupportedFile(format!(
            "Only .json question bank files can be uploaded, got \"{}\"",
            file_name
        )))
    }
}

/// Joins the `data` fields of an SSE body into events.
pub fn parse_sse_events(body: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut current: Option<String> = None;
    for line in body.lines() {
        if line.is_empty() {
            if let Some(event) = current.take() {
                events.push(event);
            }
            continue;
        }
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            match current.as_mut() {
                Some(event) => {
                    event.push('\n');
                    event.push_str(data);
                }
                None => current = Some(data.to_string()),
            }
        }
    }
    events.extend(current);
    events
}

/// Concatenates streamed chat chunks up to `[DONE]`; an `{"error": ..}` event
/// fails the whole answer.
pub fn aggregate_chat(events: &[String]) -> ClientResult<String> {
    let mut answer = String::new();
    for event in events {
        if event == "[DONE]" {
            break;
        }
        if event.starts_with('{') {
            if let Ok(JsonValue::Object(map)) = serde_json::from_str::<JsonValue>(event) {
                if let Some(error) = map.get("error") {
                    let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
                    return Err(ClientError::Server {
                        status: 502,
                        message,
                    });
                }
            }
        }
        answer.push_str(event);
    }
    Ok(answer)
}

#[derive(Debug, Clone, Default)]
pub struct UploadQuestionBank {
    pub name: String,
    pub description: Option<String>,
    pub subject_id: i64,
}

impl ApiClient {
    /// Logs in with the password form and stores the returned pair.
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<TokenResponse> {
        let request = ApiRequest::new(Method::POST, LOGIN_PATH).form(vec![
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ]);
        let tokens: TokenResponse = self.execute(request).await?;
        self.tokens()
            .set_tokens(&tokens.access_token, &tokens.refresh_token)?;
        tracing::info!(username, "logged in");
        Ok(tokens)
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> ClientResult<UserResponse> {
        let request = ApiRequest::new(Method::POST, api("/auth/register")).json(json!({
            "username": username,
            "email": email,
            "password": password,
        }));
        self.execute(request).await
    }

    /// Refreshes the session explicitly. Joins a refresh already in flight
    /// instead of starting a second one.
    pub async fn refresh(&self) -> ClientResult<String> {
        let current = self.inner.tokens.access_token();
        let result = self
            .inner
            .coordinator
            .token_after_unauthorized(self.inner.tokens.as_ref(), current.as_deref(), || {
                self.refresh_session()
            })
            .await;
        self.report(result)
    }

    pub async fn me(&self) -> ClientResult<UserResponse> {
        self.execute(ApiRequest::new(Method::GET, api("/auth/me"))).await
    }

    pub fn logout(&self) -> ClientResult<()> {
        self.tokens().clear()
    }

    pub async fn list_subjects(&self) -> ClientResult<Vec<Subject>> {
        self.execute(ApiRequest::new(Method::GET, api("/subjects"))).await
    }

    pub async fn get_subject(&self, id: i64) -> ClientResult<Subject> {
        self.execute(ApiRequest::new(Method::GET, api(&format!("/subjects/{}", id))))
            .await
    }

    pub async fn create_subject(&self, payload: &CreateSubjectPayload) -> ClientResult<Subject> {
        let request = ApiRequest::new(Method::POST, api("/subjects")).json(to_json(payload)?);
        self.execute(request).await
    }

    pub async fn update_subject(
        &self,
        id: i64,
        payload: &UpdateSubjectPayload,
    ) -> ClientResult<Subject> {
        let request = ApiRequest::new(Method::PUT, api(&format!("/subjects/{}", id)))
            .json(to_json(payload)?);
        self.execute(request).await
    }

    pub async fn delete_subject(&self, id: i64) -> ClientResult<SubjectDeleteResponse> {
        self.execute(ApiRequest::new(
            Method::DELETE,
            api(&format!("/subjects/{}", id)),
        ))
        .await
    }

    pub async fn list_question_banks(
        &self,
        query: &QuestionBankListQuery,
    ) -> ClientResult<Page<QuestionBank>> {
        let request = ApiRequest::new(Method::GET, api("/question-banks"))
            .query("page", query.page)
            .query("per_page", query.per_page)
            .query("subject_id", query.subject_id);
        self.execute(request).await
    }

    pub async fn get_question_bank(&self, id: i64) -> ClientResult<QuestionBank> {
        self.execute(ApiRequest::new(
            Method::GET,
            api(&format!("/question-banks/{}", id)),
        ))
        .await
    }

    /// Uploads a question bank file from disk. Files that are not `.json`
    /// are refused before the file is read or any request is made.
    pub async fn upload_question_bank(
        &self,
        path: impl AsRef<Path>,
        meta: &UploadQuestionBank,
    ) -> ClientResult<QuestionBankImportResponse> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        if let Err(e) = check_upload_file_name(&file_name) {
            return self.report(Err(e));
        }
        let data = match tokio::fs::read(path).await {
            Ok(data) => Bytes::from(data),
            Err(e) => return self.report(Err(e.into())),
        };
        self.upload_question_bank_bytes(&file_name, data, meta).await
    }

    pub async fn upload_question_bank_bytes(
        &self,
        file_name: &str,
        data: Bytes,
        meta: &UploadQuestionBank,
    ) -> ClientResult<QuestionBankImportResponse> {
        if let Err(e) = check_upload_file_name(file_name) {
            return self.report(Err(e));
        }

        let mut fields = vec![
            ("name".to_string(), meta.name.clone()),
            ("subject_id".to_string(), meta.subject_id.to_string()),
        ];
        if let Some(description) = &meta.description {
            fields.push(("description".to_string(), description.clone()));
        }
        let request = ApiRequest::new(Method::POST, api("/question-banks/upload")).multipart(
            fields,
            UploadFile {
                file_name: file_name.to_string(),
                data,
            },
        );
        self.execute(request).await
    }

    pub async fn update_question_bank(
        &self,
        id: i64,
        payload: &UpdateQuestionBankPayload,
    ) -> ClientResult<QuestionBank> {
        let request = ApiRequest::new(Method::PUT, api(&format!("/question-banks/{}", id)))
            .json(to_json(payload)?);
        self.execute(request).await
    }

    pub async fn delete_question_bank(&self, id: i64) -> ClientResult<JsonValue> {
        self.execute(ApiRequest::new(
            Method::DELETE,
            api(&format!("/question-banks/{}", id)),
        ))
        .await
    }

    pub async fn reimport_question_bank(&self, id: i64) -> ClientResult<QuestionBankImportResponse> {
        self.execute(ApiRequest::new(
            Method::POST,
            api(&format!("/question-banks/{}/reimport", id)),
        ))
        .await
    }

    pub async fn list_questions(&self, query: &QuestionListQuery) -> ClientResult<Page<Question>> {
        let request = ApiRequest::new(Method::GET, api("/questions"))
            .query("page", query.page)
            .query("per_page", query.per_page)
            .query("subject_id", query.subject_id)
            .query("question_bank_id", query.question_bank_id)
            .query("question_type", query.question_type.as_deref())
            .query("difficulty", query.difficulty);
        self.execute(request).await
    }

    pub async fn get_question(&self, id: i64) -> ClientResult<Question> {
        self.execute(ApiRequest::new(
            Method::GET,
            api(&format!("/questions/{}", id)),
        ))
        .await
    }

    pub async fn create_question(&self, payload: &CreateQuestionPayload) -> ClientResult<Question> {
        let request = ApiRequest::new(Method::POST, api("/questions")).json(to_json(payload)?);
        self.execute(request).await
    }

    pub async fn update_question(
        &self,
        id: i64,
        payload: &UpdateQuestionPayload,
    ) -> ClientResult<Question> {
        let request = ApiRequest::new(Method::PUT, api(&format!("/questions/{}", id)))
            .json(to_json(payload)?);
        self.execute(request).await
    }

    pub async fn delete_question(&self, id: i64) -> ClientResult<JsonValue> {
        self.execute(ApiRequest::new(
            Method::DELETE,
            api(&format!("/questions/{}", id)),
        ))
        .await
    }

    pub async fn submit_answer(
        &self,
        question_id: i64,
        payload: &SubmitAnswerPayload,
    ) -> ClientResult<AnswerResult> {
        let request = ApiRequest::new(
            Method::POST,
            api(&format!("/questions/{}/answer", question_id)),
        )
        .json(to_json(payload)?);
        self.execute(request).await
    }

    /// Sends a chat message and returns the full streamed answer.
    pub async fn chat(
        &self,
        message: &str,
        question_id: Option<i64>,
        conversation_type: Option<ConversationType>,
    ) -> ClientResult<String> {
        let request = ApiRequest::new(Method::POST, api("/ai/chat/stream")).json(json!({
            "message": message,
            "question_id": question_id,
            "conversation_type": conversation_type.unwrap_or_default(),
        }));
        let body = self.execute_text(request).await?;
        let result = aggregate_chat(&parse_sse_events(&body));
        self.report(result)
    }
}
