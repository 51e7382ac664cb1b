// src/models/attempt.rs

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use validator::Validate;

use crate::{
    error::AppError,
    models::{exam::Exam, question::PresentedQuestion},
    utils::grading::Grade,
};

/// Column list shared by every query that loads an `Attempt`.
pub const ATTEMPT_COLUMNS: &str = "id, exam_id, student_id, attempt_number, status, presentation_seed, \
     started_at, submitted_at, total_score, percentage, time_taken_seconds, \
     pushed_to_report_card, pushed_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
}

/// Represents the 'attempts' table: one student's run through an exam.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Attempt {
    pub id: i64,
    pub exam_id: i64,
    pub student_id: i64,
    pub attempt_number: i32,
    pub status: AttemptStatus,

    /// Drives question and option order; fixed for the attempt's lifetime.
    #[serde(skip)]
    pub presentation_seed: i64,

    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub total_score: Option<Decimal>,
    pub percentage: Option<Decimal>,
    pub time_taken_seconds: Option<i64>,
    pub pushed_to_report_card: bool,
    pub pushed_at: Option<DateTime<Utc>>,
}

impl Attempt {
    pub fn ensure_owned_by(&self, student_id: i64) -> Result<(), AppError> {
        if self.student_id != student_id {
            return Err(AppError::Forbidden(
                "Attempt belongs to another student".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ensure_in_progress(&self) -> Result<(), AppError> {
        if self.status != AttemptStatus::InProgress {
            return Err(AppError::InvalidState(
                "Attempt has already been submitted".to_string(),
            ));
        }
        Ok(())
    }

    /// When the attempt runs out of time: its own duration or the exam
    /// window closing, whichever comes first.
    pub fn deadline(&self, exam: &Exam) -> DateTime<Utc> {
        let by_duration = self.started_at + Duration::minutes(i64::from(exam.duration_minutes));
        by_duration.min(exam.end_at)
    }

    /// Whether answers are still accepted at `now`.
    pub fn accepts_answers_at(&self, exam: &Exam, now: DateTime<Utc>, grace_seconds: i64) -> bool {
        now < self.deadline(exam) + Duration::seconds(grace_seconds)
    }

    pub fn remaining_seconds(&self, exam: &Exam, now: DateTime<Utc>) -> i64 {
        (self.deadline(exam) - now).num_seconds().max(0)
    }

    pub fn time_taken(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds().max(0)
    }
}

/// Returned when a student starts or resumes an attempt.
#[derive(Debug, Serialize)]
pub struct StartAttemptResponse {
    pub attempt_id: i64,
    pub exam_id: i64,
    pub attempt_number: i32,
    pub status: AttemptStatus,
    pub resumed: bool,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub remaining_seconds: i64,
    pub questions: Vec<PresentedQuestion>,

    /// Previously saved selections. Key: question id, value: option id.
    pub saved_answers: HashMap<i64, i64>,
}

/// DTO for saving one answer. `option_id == 0` clears the question.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveAnswerRequest {
    #[validate(range(min = 1))]
    pub question_id: i64,
    #[validate(range(min = 0))]
    pub option_id: i64,
}

/// DTO for submitting an attempt.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitAttemptRequest {
    /// Answers not yet autosaved.
    /// Key: Question ID, Value: selected option ID (0 clears).
    #[serde(default)]
    pub answers: HashMap<i64, i64>,
}

/// Outcome of a submission or a deferred grading run.
#[derive(Debug, Serialize)]
pub struct GradeResult {
    pub attempt_id: i64,
    pub total_score: Decimal,
    pub exam_total_score: Decimal,
    pub percentage: Decimal,
    pub grade: Grade,
    pub time_taken_seconds: i64,
    pub submitted_at: DateTime<Utc>,
    pub report_card_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_card_error: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ResultsParams {
    /// Staff must name the student; students may only ask about themselves.
    pub student_id: Option<i64>,
}

/// Per-question line of a results breakdown.
#[derive(Debug, FromRow, Serialize)]
pub struct QuestionBreakdown {
    pub question_id: i64,
    pub position: i32,
    pub content: String,
    pub selected_option_id: Option<i64>,
    pub correct_option_id: Option<i64>,
    pub is_correct: bool,
    pub marks_awarded: Decimal,
    pub question_marks: Decimal,
}

/// Results of a student's submitted exam.
#[derive(Debug, Serialize)]
pub struct ExamResults {
    pub exam_id: i64,
    pub student_id: i64,
    pub attempt_id: i64,
    pub total_score: Decimal,
    pub exam_total_score: Decimal,
    pub percentage: Decimal,
    pub grade: Grade,
    pub submitted_at: Option<DateTime<Utc>>,
    pub time_taken_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Vec<QuestionBreakdown>>,
}
