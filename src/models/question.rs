// src/models/question.rs

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::prelude::FromRow;

/// Represents the 'questions' table (question bank).
/// The engine only ever reads it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Question {
    pub id: i64,

    /// Question type, e.g. 'single'.
    /// Mapped from the database column 'type' since `type` is a reserved keyword in Rust.
    #[sqlx(rename = "type")]
    pub question_type: String,

    pub content: String,
}

/// Represents the 'question_options' table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuestionOption {
    pub id: i64,
    pub question_id: i64,
    pub content: String,
    pub is_correct: bool,
    pub position: i32,
}

/// Correctness lookup for a single option, used when an answer is saved.
#[derive(Debug, Clone, FromRow)]
pub struct OptionKey {
    pub id: i64,
    pub question_id: i64,
    pub is_correct: bool,
}

/// A question of an exam together with its options and the marks it
/// carries in that exam, in stored order.
#[derive(Debug, Clone)]
pub struct BankQuestion {
    pub question: Question,
    pub marks: Decimal,
    pub options: Vec<QuestionOption>,
}

/// DTO for sending an option to a student (excludes correctness).
#[derive(Debug, Serialize)]
pub struct PublicOption {
    pub id: i64,
    pub content: String,
}

/// DTO for sending a question to a student.
#[derive(Debug, Serialize)]
pub struct PresentedQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: String,
    pub content: String,
    pub marks: Decimal,
    pub options: Vec<PublicOption>,
}
