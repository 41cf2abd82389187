use sqlx::PgPool;

use crate::dto::ai_dto::{accuracy_rate, CreateStudyRecordPayload, StudyStats};
use crate::error::Result;
use crate::models::study_record::StudyRecord;

const RECENT_RECORDS: i64 = 10;

#[derive(Clone)]
pub struct StudyService {
    pool: PgPool,
}

impl StudyService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_record(
        &self,
        user_id: i64,
        payload: CreateStudyRecordPayload,
    ) -> Result<StudyRecord> {
        let record = sqlx::query_as::<_, StudyRecord>(
            r#"
            INSERT INTO study_records (user_id, subject_id, questions_answered, correct_answers, study_time)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, subject_id, study_date, questions_answered, correct_answers, study_time
            "#,
        )
        .bind(user_id)
        .bind(payload.subject_id)
        .bind(payload.questions_answered)
        .bind(payload.correct_answers)
        .bind(payload.study_time)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn stats(&self, user_id: i64) -> Result<StudyStats> {
        let (total, correct): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE is_correct)
            FROM user_answers WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let total_study_time: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(study_time), 0)::BIGINT FROM study_records WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let subjects_studied: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT s.name
            FROM subjects s
            JOIN questions q ON q.subject_id = s.id
            JOIN user_answers ua ON ua.question_id = q.id
            WHERE ua.user_id = $1
            ORDER BY s.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let recent_records = sqlx::query_as::<_, StudyRecord>(
            r#"
            SELECT id, user_id, subject_id, study_date, questions_answered, correct_answers, study_time
            FROM study_records
            WHERE user_id = $1
            ORDER BY study_date DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(RECENT_RECORDS)
        .fetch_all(&self.pool)
        .await?;

        Ok(StudyStats {
            total_questions: total,
            correct_answers: correct,
            accuracy_rate: accuracy_rate(correct, total),
            total_study_time,
            subjects_studied,
            recent_records,
        })
    }
}
