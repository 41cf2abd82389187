use sqlx::PgPool;

use crate::dto::subject_dto::{CreateSubjectPayload, SubjectDeleteResponse, UpdateSubjectPayload};
use crate::error::{Error, Result};
use crate::models::subject::Subject;

#[derive(Clone)]
pub struct SubjectService {
    pool: PgPool,
}

impl SubjectService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Subject>> {
        let items = sqlx::query_as::<_, Subject>(
            "SELECT id, name, description, created_at FROM subjects ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Subject> {
        sqlx::query_as::<_, Subject>(
            "SELECT id, name, description, created_at FROM subjects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Subject not found".to_string()))
    }

    pub async fn exists(&self, id: i64) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT id FROM subjects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    pub async fn create(&self, payload: CreateSubjectPayload) -> Result<Subject> {
        let subject = sqlx::query_as::<_, Subject>(
            r#"
            INSERT INTO subjects (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description, created_at
            "#,
        )
        .bind(payload.name.trim())
        .bind(payload.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(subject)
    }

    pub async fn update(&self, id: i64, payload: UpdateSubjectPayload) -> Result<Subject> {
        sqlx::query_as::<_, Subject>(
            r#"
            UPDATE subjects
            SET
                name = COALESCE($2, name),
                description = COALESCE($3, description)
            WHERE id = $1
            RETURNING id, name, description, created_at
            "#,
        )
        .bind(id)
        .bind(payload.name.as_deref().map(str::trim))
        .bind(payload.description)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Subject not found".to_string()))
    }

    /// Deletes the subject with all of its questions and question banks in one
    /// transaction. Uploaded files of the removed banks are cleaned up after commit.
    pub async fn delete_cascade(&self, id: i64) -> Result<SubjectDeleteResponse> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_scalar::<_, i64>("SELECT id FROM subjects WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(Error::NotFound("Subject not found".to_string()));
        }

        let deleted_questions = sqlx::query("DELETE FROM questions WHERE subject_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected() as i64;

        let removed_files = sqlx::query_scalar::<_, Option<String>>(
            "DELETE FROM question_banks WHERE subject_id = $1 RETURNING stored_path",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        let deleted_question_banks = removed_files.len() as i64;

        sqlx::query("DELETE FROM subjects WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        for path in removed_files.into_iter().flatten() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!("Could not remove upload {}: {}", path, e);
            }
        }

        tracing::info!(
            subject_id = id,
            deleted_questions,
            deleted_question_banks,
            "subject deleted"
        );

        Ok(SubjectDeleteResponse {
            subject_id: id,
            deleted_questions,
            deleted_question_banks,
        })
    }
}
