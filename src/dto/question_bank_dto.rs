use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use validator::Validate;

use crate::models::question_bank::ImportStatus;

use super::question_dto::empty_string_as_none;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct UpdateQuestionBankPayload {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ImportStatus>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QuestionBankListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    #[serde(deserialize_with = "empty_string_as_none")]
    pub subject_id: Option<i64>,
}

/// Metadata fields of the multipart upload, collected before the bank row is created.
#[derive(Debug, Clone, Default, Validate)]
pub struct UploadMetadata {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub subject_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionBankImportResponse {
    pub question_bank_id: i64,
    pub message: String,
    pub total_questions: i64,
}

/// One entry of an uploaded question-bank file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ImportItem {
    pub section_id: Option<JsonValue>,
    pub section_name: Option<String>,
    pub question_id: Option<JsonValue>,
    pub question_title: Option<String>,
    pub question_type: Option<JsonValue>,
    pub option: Option<Vec<String>>,
    pub answer: Option<Vec<String>>,
    pub analysis: Option<String>,
    pub raw_data: Option<JsonValue>,
    pub crawl_time: Option<f64>,
}
