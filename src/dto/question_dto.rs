use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use validator::Validate;

use crate::models::question::{Question, QuestionType};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateQuestionPayload {
    pub subject_id: i64,
    pub question_bank_id: Option<i64>,
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub content: String,
    pub question_type: QuestionType,
    pub options: Option<JsonValue>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    #[serde(default = "default_difficulty")]
    #[validate(range(min = 1, max = 5))]
    pub difficulty: i32,
    pub tags: Option<Vec<String>>,
}

fn default_difficulty() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct UpdateQuestionPayload {
    #[validate(length(min = 1))]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub content: Option<String>,
    pub question_type: Option<QuestionType>,
    pub options: Option<JsonValue>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    #[validate(range(min = 1, max = 5))]
    pub difficulty: Option<i32>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QuestionListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    #[serde(deserialize_with = "empty_string_as_none")]
    pub subject_id: Option<i64>,
    #[serde(deserialize_with = "empty_string_as_none")]
    pub question_bank_id: Option<i64>,
    #[serde(deserialize_with = "empty_string_as_none")]
    pub question_type: Option<String>,
    #[serde(deserialize_with = "empty_string_as_none")]
    pub difficulty: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MyAnswersQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    #[serde(deserialize_with = "empty_string_as_none")]
    pub subject_id: Option<i64>,
}

/// Query strings from the admin UI send `subject_id=` for "all"; blank and
/// unparsable values are treated as absent.
pub fn empty_string_as_none<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw: Option<String> = Option::deserialize(de)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Ok(s.parse::<T>().ok()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitAnswerPayload {
    #[validate(length(min = 1))]
    pub user_answer: String,
    #[validate(range(min = 0))]
    pub time_spent: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerResult {
    pub is_correct: bool,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub user_answer: String,
}

/// Question as shown to learners: no answer, no explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionForApp {
    pub id: i64,
    pub subject_id: i64,
    pub title: String,
    pub content: String,
    pub question_type: String,
    pub options: Option<JsonValue>,
    pub difficulty: i32,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Question> for QuestionForApp {
    fn from(value: Question) -> Self {
        Self {
            id: value.id,
            subject_id: value.subject_id,
            title: value.title,
            content: value.content,
            question_type: value.question_type,
            options: value.options,
            difficulty: value.difficulty,
            tags: value.tags,
            created_at: value.created_at,
        }
    }
}

/// Whether a submitted answer matches: trimmed, case-insensitive.
pub fn answers_match(submitted: &str, correct: &str) -> bool {
    submitted.trim().to_lowercase() == correct.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_filters_are_ignored() {
        let query: QuestionListQuery =
            parse_query("subject_id=&question_type=&difficulty=3&page=2");
        assert_eq!(query.subject_id, None);
        assert_eq!(query.question_type, None);
        assert_eq!(query.difficulty, Some(3));
        assert_eq!(query.page, Some(2));
    }

    #[test]
    fn unparsable_filter_is_ignored() {
        let query: QuestionListQuery = parse_query("subject_id=abc");
        assert_eq!(query.subject_id, None);
    }

    #[test]
    fn answer_comparison_ignores_case_and_whitespace() {
        assert!(answers_match("  a,B ", "A,b"));
        assert!(!answers_match("A", "B"));
    }

    #[test]
    fn difficulty_out_of_range_is_rejected() {
        let payload: CreateQuestionPayload = serde_json::from_value(serde_json::json!({
            "subject_id": 1,
            "title": "t",
            "content": "c",
            "question_type": "essay",
            "correct_answer": "x",
            "difficulty": 9
        }))
        .unwrap();
        assert!(payload.validate().is_err());
    }

    fn parse_query(qs: &str) -> QuestionListQuery {
        let uri: axum::http::Uri = format!("http://localhost/?{}", qs).parse().unwrap();
        axum::extract::Query::<QuestionListQuery>::try_from_uri(&uri)
            .unwrap()
            .0
    }
}
