use chrono::Utc;
use sqlx::PgPool;

use crate::dto::ai_dto::{OverviewStats, SystemStatus};
use crate::error::Result;

#[derive(Clone)]
pub struct AdminService {
    pool: PgPool,
    ai_configured: bool,
    tts_configured: bool,
}

impl AdminService {
    pub fn new(pool: PgPool, ai_configured: bool, tts_configured: bool) -> Self {
        Self {
            pool,
            ai_configured,
            tts_configured,
        }
    }

    pub async fn status(&self) -> SystemStatus {
        let database_connected = match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Database ping failed: {}", e);
                false
            }
        };

        SystemStatus {
            status: if database_connected { "ok" } else { "degraded" }.to_string(),
            database_connected,
            ai_service_configured: self.ai_configured,
            tts_configured: self.tts_configured,
            checked_at: Utc::now(),
        }
    }

    pub async fn overview(&self) -> Result<OverviewStats> {
        let row: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM subjects),
                (SELECT COUNT(*) FROM question_banks),
                (SELECT COUNT(*) FROM questions),
                (SELECT COUNT(*) FROM user_answers),
                (SELECT COUNT(*) FROM ai_conversations)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OverviewStats {
            total_users: row.0,
            total_subjects: row.1,
            total_question_banks: row.2,
            total_questions: row.3,
            total_answers: row.4,
            total_conversations: row.5,
        })
    }
}
