use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAnswer {
    pub id: i64,
    pub user_id: i64,
    pub question_id: i64,
    pub user_answer: String,
    pub is_correct: Option<bool>,
    pub time_spent: Option<i32>,
    pub created_at: DateTime<Utc>,
}
