pub mod ai_dto;
pub mod auth_dto;
pub mod envelope;
pub mod question_bank_dto;
pub mod question_dto;
pub mod subject_dto;
