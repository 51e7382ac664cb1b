// src/models/assignment.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Represents the 'assignments' table: which students may sit an exam.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Assignment {
    pub exam_id: i64,
    pub student_id: i64,

    /// Flipped to true by grading, once, and never reset.
    pub has_submitted: bool,

    pub assigned_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}
