use serde_json::{Map, Value as JsonValue};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::dto::envelope::{page_window, Page};
use crate::dto::question_bank_dto::{
    ImportItem, QuestionBankImportResponse, QuestionBankListQuery, UpdateQuestionBankPayload,
    UploadMetadata,
};
use crate::error::{Error, Result};
use crate::models::question::QuestionType;
use crate::models::question_bank::{ImportStatus, QuestionBank};
use crate::utils::html::clean_html;

const BANK_SELECT: &str = "SELECT b.id, b.subject_id, b.name, b.description, b.file_name, \
     b.stored_path, b.total_questions, b.imported_questions, b.status, b.error_message, \
     b.created_at, b.updated_at, \
     (SELECT COUNT(*) FROM questions q WHERE q.question_bank_id = b.id) AS question_count \
     FROM question_banks b";

const ALLOWED_EXTENSIONS: [&str; 1] = ["json"];
const MAX_STORED_ERRORS: usize = 10;
const PROGRESS_EVERY: usize = 50;

/// A question decoded from an uploaded file, ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuestion {
    pub title: String,
    pub content: String,
    pub question_type: QuestionType,
    pub options: Option<JsonValue>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl ImportOutcome {
    pub fn final_status(&self) -> ImportStatus {
        if self.imported == 0 && self.failed > 0 {
            ImportStatus::Failed
        } else {
            ImportStatus::Completed
        }
    }
}

#[derive(Clone)]
pub struct QuestionBankService {
    pool: PgPool,
    uploads_dir: PathBuf,
    max_upload_bytes: usize,
}

impl QuestionBankService {
    pub fn new(pool: PgPool, uploads_dir: impl Into<PathBuf>, max_upload_bytes: usize) -> Self {
        Self {
            pool,
            uploads_dir: uploads_dir.into(),
            max_upload_bytes,
        }
    }

    pub async fn list(&self, query: &QuestionBankListQuery) -> Result<Page<QuestionBank>> {
        let (page, per_page, offset) = page_window(query.page, query.per_page, 20);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM question_banks b");
        if let Some(subject_id) = query.subject_id {
            count.push(" WHERE b.subject_id = ").push_bind(subject_id);
        }
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut items = QueryBuilder::<Postgres>::new(BANK_SELECT);
        if let Some(subject_id) = query.subject_id {
            items.push(" WHERE b.subject_id = ").push_bind(subject_id);
        }
        items
            .push(" ORDER BY b.created_at DESC, b.id DESC LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = items
            .build_query_as::<QuestionBank>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(rows, total, page, per_page))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<QuestionBank> {
        sqlx::query_as::<_, QuestionBank>(&format!("{} WHERE b.id = $1", BANK_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Question bank not found".to_string()))
    }

    pub async fn update(&self, id: i64, payload: UpdateQuestionBankPayload) -> Result<QuestionBank> {
        let updated = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE question_banks
            SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                status = COALESCE($4, status),
                error_message = COALESCE($5, error_message),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(payload.name)
        .bind(payload.description)
        .bind(payload.status.map(|s| s.as_str()))
        .bind(payload.error_message)
        .fetch_optional(&self.pool)
        .await?;
        if updated.is_none() {
            return Err(Error::NotFound("Question bank not found".to_string()));
        }
        self.get_by_id(id).await
    }

    /// Removes the bank; its questions stay and lose the bank reference.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let removed = sqlx::query_scalar::<_, Option<String>>(
            "DELETE FROM question_banks WHERE id = $1 RETURNING stored_path",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Question bank not found".to_string()))?;

        if let Some(path) = removed {
            if let Err(e) = fs::remove_file(&path).await {
                tracing::warn!("Could not remove upload {}: {}", path, e);
            }
        }
        Ok(())
    }

    /// Validates and stores an uploaded file, creates the bank row and starts
    /// the background import.
    pub async fn upload(
        &self,
        meta: UploadMetadata,
        file_name: &str,
        data: &[u8],
    ) -> Result<QuestionBankImportResponse> {
        validate_upload(file_name, data.len(), self.max_upload_bytes)?;
        let subject_id = meta
            .subject_id
            .ok_or_else(|| Error::BadRequest("subject_id is required".to_string()))?;
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::BadRequest("File must be UTF-8 encoded".to_string()))?;
        let questions = parse_question_file(text)?;

        let subject = sqlx::query_scalar::<_, i64>("SELECT id FROM subjects WHERE id = $1")
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await?;
        if subject.is_none() {
            return Err(Error::NotFound("Subject not found".to_string()));
        }
        let stored_path = self.save_upload(file_name, data).await?;

        let bank_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO question_banks (subject_id, name, description, file_name, stored_path, total_questions, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING id
            "#,
        )
        .bind(subject_id)
        .bind(meta.name.trim())
        .bind(meta.description)
        .bind(file_name)
        .bind(&stored_path)
        .bind(questions.len() as i32)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(bank_id, total = questions.len(), "question bank uploaded");
        let total_questions = questions.len() as i64;
        self.spawn_import(bank_id, questions);

        Ok(QuestionBankImportResponse {
            question_bank_id: bank_id,
            message: format!(
                "Question bank uploaded, importing {} questions",
                total_questions
            ),
            total_questions,
        })
    }

    /// Runs the import again from the stored upload. Only a failed bank is
    /// claimed, in one conditional update.
    pub async fn reimport(&self, id: i64) -> Result<QuestionBankImportResponse> {
        let bank = self.get_by_id(id).await?;
        if let Some(err) = reimport_blocked(&bank.status) {
            return Err(err);
        }
        let path = bank.stored_path.clone().ok_or_else(|| {
            Error::BadRequest("Original upload is no longer available".to_string())
        })?;
        let text = fs::read_to_string(&path).await.map_err(|e| {
            tracing::error!("Failed to read stored upload {}: {}", path, e);
            Error::BadRequest("Original upload is no longer available".to_string())
        })?;
        let questions = parse_question_file(&text)?;

        let claimed = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE question_banks
            SET status = 'pending', error_message = NULL, updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('pending', 'processing', 'completed')
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        if claimed.is_none() {
            let current = self.get_by_id(id).await?;
            return Err(reimport_blocked(&current.status).unwrap_or_else(|| {
                Error::Conflict("Import is already running".to_string())
            }));
        }

        let total_questions = questions.len() as i64;
        self.spawn_import(id, questions);

        Ok(QuestionBankImportResponse {
            question_bank_id: id,
            message: format!("Re-import started for {} questions", total_questions),
            total_questions,
        })
    }

    fn spawn_import(&self, bank_id: i64, questions: Vec<ParsedQuestion>) {
        let service = self.clone();
        tokio::spawn(async move {
            match service.import(bank_id, questions).await {
                Ok(outcome) => tracing::info!(
                    bank_id,
                    imported = outcome.imported,
                    skipped = outcome.skipped,
                    failed = outcome.failed,
                    "question bank import finished"
                ),
                Err(e) => {
                    tracing::error!(bank_id, error = ?e, "question bank import failed");
                    if let Err(mark_err) = service.mark_failed(bank_id, &e.to_string()).await {
                        tracing::error!(bank_id, error = ?mark_err, "could not record import failure");
                    }
                }
            }
        });
    }

    /// Inserts parsed questions into the bank's subject. Titles already present
    /// in that subject are skipped; per-item failures are collected.
    pub async fn import(&self, bank_id: i64, questions: Vec<ParsedQuestion>) -> Result<ImportOutcome> {
        let bank = self.get_by_id(bank_id).await?;

        sqlx::query(
            r#"
            UPDATE question_banks
            SET status = 'processing', total_questions = $2, imported_questions = 0,
                error_message = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(bank_id)
        .bind(questions.len() as i32)
        .execute(&self.pool)
        .await?;

        let mut outcome = ImportOutcome::default();
        for (index, question) in questions.into_iter().enumerate() {
            if question.title.is_empty() {
                outcome.failed += 1;
                outcome
                    .errors
                    .push(format!("Item {}: missing question title", index + 1));
                continue;
            }

            let existing = sqlx::query_scalar::<_, i64>(
                "SELECT id FROM questions WHERE subject_id = $1 AND title = $2 LIMIT 1",
            )
            .bind(bank.subject_id)
            .bind(&question.title)
            .fetch_optional(&self.pool)
            .await?;
            if existing.is_some() {
                tracing::debug!("Question already exists, skipping: {}", preview(&question.title));
                outcome.skipped += 1;
                continue;
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO questions (
                    subject_id, question_bank_id, title, content, question_type,
                    options, correct_answer, explanation, difficulty, tags
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1, $9)
                "#,
            )
            .bind(bank.subject_id)
            .bind(bank_id)
            .bind(&question.title)
            .bind(&question.content)
            .bind(question.question_type.as_str())
            .bind(&question.options)
            .bind(&question.correct_answer)
            .bind(&question.explanation)
            .bind(&question.tags)
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(_) => outcome.imported += 1,
                Err(e) => {
                    tracing::warn!("Failed to import question: {}", e);
                    outcome.failed += 1;
                    outcome
                        .errors
                        .push(format!("{}: {}", preview(&question.title), e));
                }
            }

            if (index + 1) % PROGRESS_EVERY == 0 {
                sqlx::query("UPDATE question_banks SET imported_questions = $2 WHERE id = $1")
                    .bind(bank_id)
                    .bind(outcome.imported as i32)
                    .execute(&self.pool)
                    .await?;
            }
        }

        let error_message = if outcome.errors.is_empty() {
            None
        } else {
            Some(
                outcome
                    .errors
                    .iter()
                    .take(MAX_STORED_ERRORS)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        };

        sqlx::query(
            r#"
            UPDATE question_banks
            SET status = $2, imported_questions = $3, error_message = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(bank_id)
        .bind(outcome.final_status().as_str())
        .bind(outcome.imported as i32)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(outcome)
    }

    async fn mark_failed(&self, bank_id: i64, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE question_banks SET status = 'failed', error_message = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(bank_id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_upload(&self, file_name: &str, data: &[u8]) -> Result<String> {
        fs::create_dir_all(&self.uploads_dir).await.map_err(|e| {
            tracing::error!("Failed to create uploads dir {:?}: {}", self.uploads_dir, e);
            Error::Internal(format!("Failed to save file: {}", e))
        })?;

        let ext = extension_of(file_name).unwrap_or_else(|| "json".to_string());
        let file_path = self
            .uploads_dir
            .join(format!("{}.{}", uuid::Uuid::new_v4(), ext));

        fs::write(&file_path, data).await.map_err(|e| {
            tracing::error!("Failed to write question bank file: {}", e);
            Error::Internal(format!("Failed to save file: {}", e))
        })?;

        Ok(file_path.to_string_lossy().into_owned())
    }
}

/// Why a bank in `status` cannot be reimported, if it cannot.
fn reimport_blocked(status: &str) -> Option<Error> {
    match status.parse::<ImportStatus>().ok() {
        Some(ImportStatus::Completed) => Some(Error::BadRequest(
            "Question bank has already been imported".to_string(),
        )),
        Some(ImportStatus::Pending) | Some(ImportStatus::Processing) => {
            Some(Error::Conflict("Import is already running".to_string()))
        }
        _ => None,
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

pub fn validate_upload(file_name: &str, size: usize, max_bytes: usize) -> Result<()> {
    let ext = extension_of(file_name).unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(Error::BadRequest(
            "Only JSON question bank files are supported".to_string(),
        ));
    }
    if size == 0 {
        return Err(Error::BadRequest("Uploaded file is empty".to_string()));
    }
    if size > max_bytes {
        return Err(Error::BadRequest(format!(
            "File size must not exceed {} MB",
            max_bytes / (1024 * 1024)
        )));
    }
    Ok(())
}

pub fn parse_question_file(content: &str) -> Result<Vec<ParsedQuestion>> {
    let items: Vec<ImportItem> = serde_json::from_str(content)
        .map_err(|e| Error::BadRequest(format!("Invalid question bank file: {}", e)))?;
    Ok(items.into_iter().map(ParsedQuestion::from).collect())
}

impl From<ImportItem> for ParsedQuestion {
    fn from(item: ImportItem) -> Self {
        let raw_object = item.raw_data.as_ref().and_then(JsonValue::as_object);

        let raw_text = match &item.raw_data {
            Some(JsonValue::Object(map)) => non_empty_str(map.get("content"))
                .or_else(|| non_empty_str(map.get("text")))
                .map(str::to_string)
                .unwrap_or_else(|| JsonValue::Object(map.clone()).to_string()),
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        let show_type_name = raw_object
            .and_then(|m| non_empty_str(m.get("show_type_name")))
            .unwrap_or_default();

        let question_type = QuestionType::from_label(show_type_name).unwrap_or_else(|| {
            match &item.question_type {
                Some(JsonValue::Number(n)) => QuestionType::from_code(n.as_i64().unwrap_or(1)),
                Some(JsonValue::String(s)) => {
                    QuestionType::from_label(s).unwrap_or(QuestionType::SingleChoice)
                }
                _ => QuestionType::SingleChoice,
            }
        });

        let tags = item
            .section_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| vec![s.to_string()])
            .unwrap_or_default();

        Self {
            title: clean_html(item.question_title.as_deref().unwrap_or_default()),
            content: clean_html(&raw_text),
            question_type,
            options: format_options(item.option.as_deref().unwrap_or_default()),
            correct_answer: item.answer.unwrap_or_default().join(","),
            explanation: item.analysis.filter(|a| !a.trim().is_empty()),
            tags,
        }
    }
}

fn non_empty_str(value: Option<&JsonValue>) -> Option<&str> {
    value.and_then(JsonValue::as_str).filter(|s| !s.is_empty())
}

/// `["x", "y"]` becomes `{"A": "x", "B": "y"}`.
fn format_options(options: &[String]) -> Option<JsonValue> {
    if options.is_empty() {
        return None;
    }
    let mut map = Map::new();
    for (i, option) in options.iter().enumerate() {
        map.insert(option_label(i), JsonValue::String(option.trim().to_string()));
    }
    Some(JsonValue::Object(map))
}

/// Spreadsheet-style labels: A..Z, then AA, AB, ...
fn option_label(index: usize) -> String {
    let mut n = index + 1;
    let mut label = Vec::new();
    while n > 0 {
        n -= 1;
        label.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    label.reverse();
    String::from_utf8_lossy(&label).into_owned()
}

fn preview(title: &str) -> String {
    let short: String = title.chars().take(50).collect();
    if short.len() < title.len() {
        format!("{}...", short)
    } else {
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_non_json_extension() {
        let err = validate_upload("bank.txt", 10, 1024).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert!(validate_upload("BANK.JSON", 10, 1024).is_ok());
    }

    #[test]
    fn rejects_oversized_and_empty_files() {
        assert!(validate_upload("bank.json", 0, 1024).is_err());
        assert!(validate_upload("bank.json", 2 * 1024 * 1024, 1024 * 1024).is_err());
    }

    #[test]
    fn option_labels_continue_past_z() {
        assert_eq!(option_label(0), "A");
        assert_eq!(option_label(25), "Z");
        assert_eq!(option_label(26), "AA");
        assert_eq!(option_label(27), "AB");
        assert_eq!(option_label(701), "ZZ");
        assert_eq!(option_label(702), "AAA");

        let options: Vec<String> = (0..28).map(|i| format!("opt {}", i)).collect();
        let formatted = format_options(&options).unwrap();
        assert_eq!(formatted["AB"], "opt 27");
        assert_eq!(formatted.as_object().unwrap().len(), 28);
    }

    #[test]
    fn only_failed_banks_can_be_reimported() {
        assert!(matches!(
            reimport_blocked("completed"),
            Some(Error::BadRequest(_))
        ));
        assert!(matches!(reimport_blocked("pending"), Some(Error::Conflict(_))));
        assert!(matches!(
            reimport_blocked("processing"),
            Some(Error::Conflict(_))
        ));
        assert!(reimport_blocked("failed").is_none());
    }

    #[test]
    fn malformed_json_is_a_bad_request() {
        let err = parse_question_file("{not json").unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn parses_crawler_items() {
        let file = json!([
            {
                "section_id": "s1",
                "section_name": "操作系统",
                "question_id": 101,
                "question_title": "<p>进程和线程的区别？</p>",
                "question_type": 1,
                "option": [" 资源分配 ", "调度单位"],
                "answer": ["A", "B"],
                "analysis": "进程是资源分配单位",
                "raw_data": { "content": "<div>题干</div>", "show_type_name": "多选题" }
            },
            {
                "question_title": "简述死锁条件",
                "question_type": 3,
                "raw_data": "plain body"
            }
        ])
        .to_string();

        let parsed = parse_question_file(&file).unwrap();
        assert_eq!(parsed.len(), 2);

        let first = &parsed[0];
        assert_eq!(first.title, "进程和线程的区别？");
        assert_eq!(first.content, "题干");
        assert_eq!(first.question_type, QuestionType::MultipleChoice);
        assert_eq!(first.options, Some(json!({ "A": "资源分配", "B": "调度单位" })));
        assert_eq!(first.correct_answer, "A,B");
        assert_eq!(first.explanation.as_deref(), Some("进程是资源分配单位"));
        assert_eq!(first.tags, vec!["操作系统".to_string()]);

        let second = &parsed[1];
        assert_eq!(second.question_type, QuestionType::Essay);
        assert_eq!(second.content, "plain body");
        assert_eq!(second.options, None);
        assert_eq!(second.correct_answer, "");
        assert!(second.tags.is_empty());
    }

    #[test]
    fn string_question_type_is_mapped() {
        let file = json!([{ "question_title": "q", "question_type": "填空题" }]).to_string();
        let parsed = parse_question_file(&file).unwrap();
        assert_eq!(parsed[0].question_type, QuestionType::FillBlank);
    }

    #[test]
    fn outcome_status() {
        let all_failed = ImportOutcome {
            failed: 3,
            ..Default::default()
        };
        assert_eq!(all_failed.final_status(), ImportStatus::Failed);

        let partial = ImportOutcome {
            imported: 2,
            failed: 1,
            ..Default::default()
        };
        assert_eq!(partial.final_status(), ImportStatus::Completed);
        assert_eq!(ImportOutcome::default().final_status(), ImportStatus::Completed);
    }

    #[test]
    fn preview_truncates_by_chars() {
        let long = "题".repeat(60);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), 53);
        assert_eq!(preview("short"), "short");
    }
}
