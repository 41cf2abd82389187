pub mod client;
pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::services::{
    admin_service::AdminService, ai_service::AiService, auth_service::AuthService,
    question_bank_service::QuestionBankService, question_service::QuestionService,
    study_service::StudyService, subject_service::SubjectService, tts_service::TtsService,
};
use crate::utils::token::JwtKeys;
use reqwest::Client;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt: JwtKeys,
    pub auth_service: AuthService,
    pub subject_service: SubjectService,
    pub question_bank_service: QuestionBankService,
    pub question_service: QuestionService,
    pub ai_service: AiService,
    pub study_service: StudyService,
    pub tts_service: TtsService,
    pub admin_service: AdminService,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let jwt = JwtKeys::new(
            &config.jwt_secret,
            config.access_token_expire_minutes,
            config.refresh_token_expire_days,
        );

        let auth_service = AuthService::new(pool.clone(), jwt.clone());
        let subject_service = SubjectService::new(pool.clone());
        let question_bank_service = QuestionBankService::new(
            pool.clone(),
            config.uploads_dir.clone(),
            config.max_upload_bytes,
        );
        let question_service = QuestionService::new(pool.clone());
        let ai_service = AiService::new(
            pool.clone(),
            http_client.clone(),
            config.dify_api_url.clone(),
            config.dify_api_key.clone(),
        );
        let study_service = StudyService::new(pool.clone());
        let tts_service = TtsService::new(http_client, config.tts_api_url.clone());
        let admin_service = AdminService::new(
            pool.clone(),
            ai_service.is_configured(),
            tts_service.is_configured(),
        );

        Ok(Self {
            pool,
            config: Arc::new(config),
            jwt,
            auth_service,
            subject_service,
            question_bank_service,
            question_service,
            ai_service,
            study_service,
            tts_service,
            admin_service,
        })
    }
}
