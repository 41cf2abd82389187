use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::dto::envelope::{page_window, Page};
use crate::dto::question_dto::{
    answers_match, AnswerResult, CreateQuestionPayload, MyAnswersQuery, QuestionListQuery,
    SubmitAnswerPayload, UpdateQuestionPayload,
};
use crate::error::{Error, Result};
use crate::models::question::Question;
use crate::models::user_answer::UserAnswer;

const QUESTION_COLUMNS: &str = "id, subject_id, question_bank_id, title, content, question_type, \
     options, correct_answer, explanation, difficulty, tags, created_at, updated_at";

const ANSWER_COLUMNS: &str =
    "ua.id, ua.user_id, ua.question_id, ua.user_answer, ua.is_correct, ua.time_spent, ua.created_at";

#[derive(Clone)]
pub struct QuestionService {
    pool: PgPool,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &QuestionListQuery) {
    let mut sep = " WHERE ";
    if let Some(subject_id) = query.subject_id {
        builder.push(sep).push("subject_id = ").push_bind(subject_id);
        sep = " AND ";
    }
    if let Some(bank_id) = query.question_bank_id {
        builder.push(sep).push("question_bank_id = ").push_bind(bank_id);
        sep = " AND ";
    }
    if let Some(question_type) = &query.question_type {
        builder
            .push(sep)
            .push("question_type = ")
            .push_bind(question_type.clone());
        sep = " AND ";
    }
    if let Some(difficulty) = query.difficulty {
        builder.push(sep).push("difficulty = ").push_bind(difficulty);
    }
}

impl QuestionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, query: &QuestionListQuery) -> Result<Page<Question>> {
        let (page, per_page, offset) = page_window(query.page, query.per_page, 20);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM questions");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut items =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM questions", QUESTION_COLUMNS));
        push_filters(&mut items, query);
        items
            .push(" ORDER BY id LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = items
            .build_query_as::<Question>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(rows, total, page, per_page))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Question> {
        sqlx::query_as::<_, Question>(&format!(
            "SELECT {} FROM questions WHERE id = $1",
            QUESTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Question not found".to_string()))
    }

    pub async fn create(&self, payload: CreateQuestionPayload) -> Result<Question> {
        let subject = sqlx::query_scalar::<_, i64>("SELECT id FROM subjects WHERE id = $1")
            .bind(payload.subject_id)
            .fetch_optional(&self.pool)
            .await?;
        if subject.is_none() {
            return Err(Error::NotFound("Subject not found".to_string()));
        }
        if let Some(bank_id) = payload.question_bank_id {
            let bank = sqlx::query_scalar::<_, i64>("SELECT id FROM question_banks WHERE id = $1")
                .bind(bank_id)
                .fetch_optional(&self.pool)
                .await?;
            if bank.is_none() {
                return Err(Error::NotFound("Question bank not found".to_string()));
            }
        }

        let question = sqlx::query_as::<_, Question>(&format!(
            r#"
            INSERT INTO questions (
                subject_id, question_bank_id, title, content, question_type,
                options, correct_answer, explanation, difficulty, tags
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            QUESTION_COLUMNS
        ))
        .bind(payload.subject_id)
        .bind(payload.question_bank_id)
        .bind(payload.title)
        .bind(payload.content)
        .bind(payload.question_type.as_str())
        .bind(payload.options)
        .bind(payload.correct_answer)
        .bind(payload.explanation)
        .bind(payload.difficulty)
        .bind(payload.tags.unwrap_or_default())
        .fetch_one(&self.pool)
        .await?;

        Ok(question)
    }

    pub async fn update(&self, id: i64, payload: UpdateQuestionPayload) -> Result<Question> {
        sqlx::query_as::<_, Question>(&format!(
            r#"
            UPDATE questions
            SET
                title = COALESCE($2, title),
                content = COALESCE($3, content),
                question_type = COALESCE($4, question_type),
                options = COALESCE($5, options),
                correct_answer = COALESCE($6, correct_answer),
                explanation = COALESCE($7, explanation),
                difficulty = COALESCE($8, difficulty),
                tags = COALESCE($9, tags),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            QUESTION_COLUMNS
        ))
        .bind(id)
        .bind(payload.title)
        .bind(payload.content)
        .bind(payload.question_type.map(|t| t.as_str()))
        .bind(payload.options)
        .bind(payload.correct_answer)
        .bind(payload.explanation)
        .bind(payload.difficulty)
        .bind(payload.tags)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Question not found".to_string()))
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let res = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound("Question not found".to_string()));
        }
        Ok(())
    }

    /// Records the user's answer, replacing an earlier one for the same question.
    pub async fn submit_answer(
        &self,
        user_id: i64,
        question_id: i64,
        payload: SubmitAnswerPayload,
    ) -> Result<AnswerResult> {
        let question = self.get_by_id(question_id).await?;
        let is_correct = answers_match(&payload.user_answer, &question.correct_answer);

        sqlx::query(
            r#"
            INSERT INTO user_answers (user_id, question_id, user_answer, is_correct, time_spent)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, question_id) DO UPDATE
            SET user_answer = EXCLUDED.user_answer,
                is_correct = EXCLUDED.is_correct,
                time_spent = EXCLUDED.time_spent,
                created_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(question_id)
        .bind(&payload.user_answer)
        .bind(is_correct)
        .bind(payload.time_spent)
        .execute(&self.pool)
        .await?;

        Ok(AnswerResult {
            is_correct,
            correct_answer: question.correct_answer,
            explanation: question.explanation,
            user_answer: payload.user_answer,
        })
    }

    pub async fn answer_of(&self, user_id: i64, question_id: i64) -> Result<Option<UserAnswer>> {
        let answer = sqlx::query_as::<_, UserAnswer>(&format!(
            "SELECT {} FROM user_answers ua WHERE ua.user_id = $1 AND ua.question_id = $2",
            ANSWER_COLUMNS
        ))
        .bind(user_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(answer)
    }

    pub async fn my_answers(&self, user_id: i64, query: &MyAnswersQuery) -> Result<Page<UserAnswer>> {
        let (page, per_page, offset) = page_window(query.page, query.per_page, 50);

        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM user_answers ua JOIN questions q ON q.id = ua.question_id WHERE ua.user_id = ",
        );
        count.push_bind(user_id);
        if let Some(subject_id) = query.subject_id {
            count.push(" AND q.subject_id = ").push_bind(subject_id);
        }
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut items = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM user_answers ua JOIN questions q ON q.id = ua.question_id WHERE ua.user_id = ",
            ANSWER_COLUMNS
        ));
        items.push_bind(user_id);
        if let Some(subject_id) = query.subject_id {
            items.push(" AND q.subject_id = ").push_bind(subject_id);
        }
        items
            .push(" ORDER BY ua.created_at DESC LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = items
            .build_query_as::<UserAnswer>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(rows, total, page, per_page))
    }
}
