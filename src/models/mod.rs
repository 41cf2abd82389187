pub mod ai_conversation;
pub mod question;
pub mod question_bank;
pub mod study_record;
pub mod subject;
pub mod user;
pub mod user_answer;
