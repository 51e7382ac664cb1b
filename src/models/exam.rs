// src/models/exam.rs

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{
    config::{DEFAULT_WINDOW_DAYS, DEFAULT_WINDOW_LEAD_MINUTES},
    error::AppError,
    utils::presentation::PresentationConfig,
};

/// Column list shared by every query that loads an `Exam`.
pub const EXAM_COLUMNS: &str = "id, tenant_id, created_by, title, subject, class_name, session, term, \
     assessment_type, total_score, duration_minutes, start_at, end_at, shuffle_questions, \
     shuffle_options, show_results_immediately, auto_update_report_card, is_published, \
     published_at, created_at, updated_at";

/// Represents the 'exams' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Exam {
    pub id: i64,
    pub tenant_id: i64,
    pub created_by: i64,
    pub title: String,
    pub subject: String,
    pub class_name: String,
    pub session: String,
    pub term: String,

    /// Free-form label. Only "exam" is special: it feeds the terminal-exam
    /// slot of the report card, everything else feeds the CA slot.
    pub assessment_type: String,

    /// Authoritative achievable marks; question marks are derived from it.
    pub total_score: Decimal,
    pub duration_minutes: i32,

    /// Availability window, half-open: `[start_at, end_at)`.
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,

    pub shuffle_questions: bool,
    pub shuffle_options: bool,
    pub show_results_immediately: bool,
    pub auto_update_report_card: bool,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Exam {
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_at && now < self.end_at
    }

    /// Exams are only visible inside the school that owns them.
    pub fn ensure_tenant(&self, tenant_id: i64) -> Result<(), AppError> {
        if self.tenant_id != tenant_id {
            return Err(AppError::Forbidden(
                "Exam belongs to another school".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ensure_draft(&self, action: &str) -> Result<(), AppError> {
        if self.is_published {
            return Err(AppError::InvalidState(format!(
                "Cannot {} a published exam",
                action
            )));
        }
        Ok(())
    }

    pub fn presentation_config(&self) -> PresentationConfig {
        PresentationConfig {
            shuffle_questions: self.shuffle_questions,
            shuffle_options: self.shuffle_options,
        }
    }
}

/// Join row between an exam and a question bank entry.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExamQuestion {
    pub exam_id: i64,
    pub question_id: i64,
    pub position: i32,
    pub marks: Decimal,
}

/// Instructor view of an exam with its derived marks.
#[derive(Debug, Serialize)]
pub struct ExamDetail {
    #[serde(flatten)]
    pub exam: Exam,
    pub questions: Vec<ExamQuestion>,
    pub assigned_count: i64,
    pub submitted_count: i64,
}

/// DTO for creating an exam.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamRequest {
    #[validate(length(max = 200), custom(function = not_blank))]
    pub title: String,
    #[validate(length(max = 100), custom(function = not_blank))]
    pub subject: String,
    #[validate(length(max = 100), custom(function = not_blank))]
    pub class_name: String,
    #[validate(length(max = 50), custom(function = not_blank))]
    pub session: String,
    #[validate(length(max = 50), custom(function = not_blank))]
    pub term: String,
    #[validate(length(max = 50), custom(function = not_blank))]
    pub assessment_type: String,

    /// Defaults to `DEFAULT_TOTAL_SCORE`.
    pub total_score: Option<Decimal>,

    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: i32,

    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub shuffle_questions: bool,
    #[serde(default)]
    pub shuffle_options: bool,
    #[serde(default)]
    pub show_results_immediately: bool,
    #[serde(default)]
    pub auto_update_report_card: bool,
}

/// DTO for editing an exam. Every field is optional.
/// `total_score` is structural and only editable while the exam is a draft.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateExamRequest {
    #[validate(length(max = 200), custom(function = not_blank))]
    pub title: Option<String>,
    pub total_score: Option<Decimal>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: Option<i32>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub shuffle_questions: Option<bool>,
    pub shuffle_options: Option<bool>,
    pub show_results_immediately: Option<bool>,
    pub auto_update_report_card: Option<bool>,
}

/// DTO for replacing an exam's question set. Order is significant.
#[derive(Debug, Deserialize, Validate)]
pub struct SetQuestionsRequest {
    #[validate(length(max = 500))]
    pub question_ids: Vec<i64>,
}

/// DTO for assigning students to an exam.
#[derive(Debug, Deserialize, Validate)]
pub struct AssignStudentsRequest {
    #[validate(length(min = 1, max = 1000))]
    pub student_ids: Vec<i64>,
}

/// Rejects labels that are empty once trimmed.
fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("must_not_be_blank"));
    }
    Ok(())
}

/// Fills in a missing availability window and checks it is well formed.
///
/// With nothing given the exam opens five minutes ago and closes in seven
/// days, so it is available straight away.
pub fn resolve_window(
    start_at: Option<DateTime<Utc>>,
    end_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let start = start_at.unwrap_or(now - Duration::minutes(DEFAULT_WINDOW_LEAD_MINUTES));
    let end = end_at.unwrap_or(start + Duration::days(DEFAULT_WINDOW_DAYS));

    if end <= start {
        return Err(AppError::BadRequest(
            "end_at must be after start_at".to_string(),
        ));
    }
    Ok((start, end))
}

pub fn validate_total_score(total_score: Decimal) -> Result<(), AppError> {
    if total_score.is_sign_negative() {
        return Err(AppError::BadRequest(
            "total_score must not be negative".to_string(),
        ));
    }
    if total_score.scale() > 2 && total_score != total_score.round_dp(2) {
        return Err(AppError::BadRequest(
            "total_score supports at most two decimal places".to_string(),
        ));
    }
    Ok(())
}
