use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StudyRecord {
    pub id: i64,
    pub user_id: i64,
    pub subject_id: Option<i64>,
    pub study_date: DateTime<Utc>,
    pub questions_answered: i32,
    pub correct_answers: i32,
    pub study_time: i32,
}
