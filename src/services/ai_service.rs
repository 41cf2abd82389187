use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::dto::ai_dto::{ChatRequest, ConversationType};
use crate::error::{Error, Result};
use crate::models::ai_conversation::AiConversation;
use crate::models::question::Question;

pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Marker sent after the last chunk of a chat stream.
pub const STREAM_DONE: &str = "[DONE]";

const CONVERSATION_HISTORY_LIMIT: i64 = 50;

/// Splits a Dify streaming body into answer chunks. Bytes may arrive cut at
/// any point, including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct DifyStreamDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl DifyStreamDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut answers = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(answer) = self.decode_line(&String::from_utf8_lossy(&line)) {
                answers.push(answer);
            }
        }
        answers
    }

    /// Flushes a trailing line that had no newline.
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        let answer = self.decode_line(&String::from_utf8_lossy(&rest));
        self.done = true;
        answer.into_iter().collect()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn decode_line(&mut self, line: &str) -> Option<String> {
        if self.done {
            return None;
        }
        let data = line.trim_end().strip_prefix("data:")?.trim_start();
        if data == STREAM_DONE {
            self.done = true;
            return None;
        }
        let event: JsonValue = serde_json::from_str(data).ok()?;
        match event.get("event").and_then(JsonValue::as_str) {
            Some("message") | Some("agent_message") => event
                .get("answer")
                .and_then(JsonValue::as_str)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            Some("message_end") => {
                self.done = true;
                None
            }
            _ => None,
        }
    }
}

/// Prefixes the user's message with question context when there is any.
pub fn compose_message(message: &str, context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!("上下文：{}\n\n用户问题：{}", context, message),
        None => message.to_string(),
    }
}

fn question_text(question: &Question) -> String {
    format!("{}\n{}", question.title, question.content)
}

fn explanation_prompt(question: &str, user_answer: &str, correct_answer: &str) -> String {
    format!(
        "请为以下题目提供详细解析：\n\n题目：{}\n用户答案：{}\n正确答案：{}\n\n\
         请分析用户答案的对错，并提供详细的解题思路和知识点解释。",
        question, user_answer, correct_answer
    )
}

fn hint_prompt(question: &str) -> String {
    format!(
        "请为以下题目提供解题提示，不要直接给出答案：\n\n题目：{}\n\n\
         请提供解题思路和相关知识点的提示。",
        question
    )
}

#[derive(Clone)]
pub struct AiService {
    pool: PgPool,
    client: Client,
    base_url: String,
    api_key: String,
}

impl AiService {
    pub fn new(pool: PgPool, client: Client, base_url: String, api_key: String) -> Self {
        Self {
            pool,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Opens a streaming chat against the Dify-compatible upstream.
    pub async fn stream_chat(
        &self,
        message: &str,
        user_id: i64,
        context: Option<&str>,
    ) -> Result<AnswerStream> {
        let mut inputs = serde_json::Map::new();
        if let Some(context) = context {
            inputs.insert("context".to_string(), JsonValue::String(context.to_string()));
        }
        let payload = serde_json::json!({
            "inputs": inputs,
            "query": message,
            "response_mode": "streaming",
            "conversation_id": "",
            "user": user_id.to_string(),
        });

        let res = self
            .client
            .post(format!("{}/v1/chat-messages", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .timeout(Duration::from_secs(120))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            tracing::error!("Chat upstream returned {}: {}", status, text);
            return Err(Error::Upstream(format!("chat service returned {}", status)));
        }

        let body = Box::pin(res.bytes_stream());
        let answers = stream::unfold(
            (body, DifyStreamDecoder::default(), VecDeque::new()),
            |(mut body, mut decoder, mut pending)| async move {
                loop {
                    if let Some(answer) = pending.pop_front() {
                        return Some((Ok(answer), (body, decoder, pending)));
                    }
                    if decoder.is_done() {
                        return None;
                    }
                    match body.next().await {
                        Some(Ok(bytes)) => pending.extend(decoder.push(&bytes)),
                        Some(Err(e)) => {
                            decoder.finish();
                            return Some((Err(Error::Reqwest(e)), (body, decoder, pending)));
                        }
                        None => pending.extend(decoder.finish()),
                    }
                }
            },
        );

        Ok(Box::pin(answers))
    }

    /// Runs a full chat stream, forwarding each chunk to `sink` and storing the
    /// conversation once the upstream finishes. Errors are sent as a JSON
    /// `error` payload instead of `[DONE]`.
    pub async fn run_chat(&self, user_id: i64, request: ChatRequest, sink: mpsc::Sender<String>) {
        match self.forward_chat(user_id, &request, &sink).await {
            Ok(()) => {
                let _ = sink.send(STREAM_DONE.to_string()).await;
            }
            Err(e) => {
                tracing::error!(user_id, error = ?e, "chat stream failed");
                let payload = serde_json::json!({ "error": e.to_string() }).to_string();
                let _ = sink.send(payload).await;
            }
        }
    }

    async fn forward_chat(
        &self,
        user_id: i64,
        request: &ChatRequest,
        sink: &mpsc::Sender<String>,
    ) -> Result<()> {
        let context = self.chat_context(user_id, request).await?;
        let message = compose_message(&request.message, context.as_deref());

        let mut answers = self.stream_chat(&message, user_id, None).await?;
        let mut full_response = String::new();
        while let Some(chunk) = answers.next().await {
            let chunk = chunk?;
            full_response.push_str(&chunk);
            if sink.send(chunk).await.is_err() {
                tracing::debug!(user_id, "chat client went away");
                break;
            }
        }

        self.save_conversation(
            user_id,
            request.question_id,
            &request.message,
            &full_response,
            request.conversation_type,
        )
        .await?;
        Ok(())
    }

    async fn chat_context(&self, user_id: i64, request: &ChatRequest) -> Result<Option<String>> {
        let Some(question_id) = request.question_id else {
            return Ok(request.context.clone());
        };
        let Some(question) = self.find_question(question_id).await? else {
            return Ok(request.context.clone());
        };

        let mut context = format!("题目：{}\n内容：{}", question.title, question.content);
        if request.conversation_type == ConversationType::Explanation {
            if let Some(user_answer) = self.user_answer(user_id, question_id).await? {
                context.push_str(&format!(
                    "\n用户答案：{}\n正确答案：{}",
                    user_answer, question.correct_answer
                ));
            }
        }
        Ok(Some(context))
    }

    pub async fn explanation(&self, user_id: i64, question_id: i64) -> Result<String> {
        let question = self
            .find_question(question_id)
            .await?
            .ok_or_else(|| Error::NotFound("Question not found".to_string()))?;
        let user_answer = self
            .user_answer(user_id, question_id)
            .await?
            .ok_or_else(|| Error::BadRequest("Please answer the question first".to_string()))?;

        let prompt = explanation_prompt(
            &question_text(&question),
            &user_answer,
            &question.correct_answer,
        );
        let explanation = self.complete(&prompt, user_id).await?;

        self.save_conversation(
            user_id,
            Some(question_id),
            "请解析这道题",
            &explanation,
            ConversationType::Explanation,
        )
        .await?;
        Ok(explanation)
    }

    pub async fn hint(&self, user_id: i64, question_id: i64) -> Result<String> {
        let question = self
            .find_question(question_id)
            .await?
            .ok_or_else(|| Error::NotFound("Question not found".to_string()))?;

        let hint = self
            .complete(&hint_prompt(&question_text(&question)), user_id)
            .await?;

        self.save_conversation(
            user_id,
            Some(question_id),
            "请给我一些提示",
            &hint,
            ConversationType::Hint,
        )
        .await?;
        Ok(hint)
    }

    async fn complete(&self, prompt: &str, user_id: i64) -> Result<String> {
        let mut answers = self.stream_chat(prompt, user_id, None).await?;
        let mut full = String::new();
        while let Some(chunk) = answers.next().await {
            full.push_str(&chunk?);
        }
        Ok(full)
    }

    pub async fn conversations(&self, user_id: i64) -> Result<Vec<AiConversation>> {
        let rows = sqlx::query_as::<_, AiConversation>(
            r#"
            SELECT id, user_id, question_id, user_message, ai_response, conversation_type, created_at
            FROM ai_conversations
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(CONVERSATION_HISTORY_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn save_conversation(
        &self,
        user_id: i64,
        question_id: Option<i64>,
        user_message: &str,
        ai_response: &str,
        conversation_type: ConversationType,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ai_conversations (user_id, question_id, user_message, ai_response, conversation_type)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(question_id)
        .bind(user_message)
        .bind(ai_response)
        .bind(conversation_type.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_question(&self, id: i64) -> Result<Option<Question>> {
        let question = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, subject_id, question_bank_id, title, content, question_type,
                   options, correct_answer, explanation, difficulty, tags, created_at, updated_at
            FROM questions WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(question)
    }

    async fn user_answer(&self, user_id: i64, question_id: i64) -> Result<Option<String>> {
        let answer = sqlx::query_scalar::<_, String>(
            "SELECT user_answer FROM user_answers WHERE user_id = $1 AND question_id = $2",
        )
        .bind(user_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(answer)
    }
}
