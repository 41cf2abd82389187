use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: i64,
    pub subject_id: i64,
    pub question_bank_id: Option<i64>,
    pub title: String,
    pub content: String,
    pub question_type: String,
    pub options: Option<JsonValue>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub difficulty: i32,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    FillBlank,
    Essay,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::FillBlank => "fill_blank",
            QuestionType::Essay => "essay",
        }
    }

    /// Type codes used by the crawler export format.
    pub fn from_code(code: i64) -> Self {
        match code {
            2 => QuestionType::MultipleChoice,
            3 => QuestionType::Essay,
            9 => QuestionType::FillBlank,
            _ => QuestionType::SingleChoice,
        }
    }

    /// Display names carried in `raw_data.show_type_name`, plus the english aliases.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "单选题" | "single_choice" => Some(QuestionType::SingleChoice),
            "多选题" | "multiple_choice" => Some(QuestionType::MultipleChoice),
            "判断题" | "true_false" => Some(QuestionType::TrueFalse),
            "填空题" | "fill_blank" => Some(QuestionType::FillBlank),
            "简答题" | "问答题" | "essay" | "short_answer" => Some(QuestionType::Essay),
            _ => None,
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuestionType::from_label(s).ok_or_else(|| format!("unknown question type: {}", s))
    }
}
