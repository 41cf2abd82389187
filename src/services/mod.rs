pub mod admin_service;
pub mod ai_service;
pub mod auth_service;
pub mod question_bank_service;
pub mod question_service;
pub mod study_service;
pub mod subject_service;
pub mod tts_service;
