use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::study_record::StudyRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    #[default]
    Discussion,
    Explanation,
    Hint,
}

impl ConversationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationType::Discussion => "discussion",
            ConversationType::Explanation => "explanation",
            ConversationType::Hint => "hint",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 8000))]
    pub message: String,
    pub question_id: Option<i64>,
    #[serde(default)]
    pub conversation_type: ConversationType,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExplanationResponse {
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HintResponse {
    pub hint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateStudyRecordPayload {
    pub subject_id: Option<i64>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub questions_answered: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub correct_answers: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub study_time: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyStats {
    pub total_questions: i64,
    pub correct_answers: i64,
    pub accuracy_rate: f64,
    pub total_study_time: i64,
    pub subjects_studied: Vec<String>,
    pub recent_records: Vec<StudyRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TtsRequest {
    #[validate(length(min = 1, max = 5000))]
    pub text: String,
    pub voice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsResponse {
    pub content_type: String,
    pub audio_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub status: String,
    pub database_connected: bool,
    pub ai_service_configured: bool,
    pub tts_configured: bool,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OverviewStats {
    pub total_users: i64,
    pub total_subjects: i64,
    pub total_question_banks: i64,
    pub total_questions: i64,
    pub total_answers: i64,
    pub total_conversations: i64,
}

/// Accuracy as a percentage rounded to two decimals.
pub fn accuracy_rate(correct: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let rate = correct as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}
