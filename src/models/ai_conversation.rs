use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AiConversation {
    pub id: i64,
    pub user_id: i64,
    pub question_id: Option<i64>,
    pub user_message: String,
    pub ai_response: String,
    pub conversation_type: String,
    pub created_at: DateTime<Utc>,
}
