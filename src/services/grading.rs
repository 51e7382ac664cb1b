// src/services/grading.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, GradeResult},
        exam::Exam,
    },
    services::report_card::FollowUp,
    utils::grading::{Grade, percentage},
};

/// How response correctness is treated when an attempt is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rescore {
    /// Trust `is_correct` / `marks_awarded` as recorded at save time.
    Keep,
    /// Re-read every selected option's current correct flag first, so
    /// question bank corrections change the result.
    FromQuestionBank,
}

/// Scores committed for an attempt.
#[derive(Debug, Clone)]
pub struct GradeSummary {
    pub attempt_id: i64,
    pub total_score: Decimal,
    pub exam_total_score: Decimal,
    pub percentage: Decimal,
    pub grade: Grade,
    pub time_taken_seconds: i64,
    pub submitted_at: DateTime<Utc>,
}

impl GradeSummary {
    /// Response body once the grade is committed and any propagation has run.
    pub fn into_result(self, follow_up: FollowUp, message: &str) -> GradeResult {
        GradeResult {
            attempt_id: self.attempt_id,
            total_score: self.total_score,
            exam_total_score: self.exam_total_score,
            percentage: self.percentage,
            grade: self.grade,
            time_taken_seconds: self.time_taken_seconds,
            submitted_at: self.submitted_at,
            report_card_updated: follow_up.updated,
            report_card_error: follow_up.error,
            message: message.to_string(),
        }
    }
}

/// Scores an in-progress attempt and closes it.
///
/// Sums the responses, derives the percentage against the exam total,
/// moves the attempt to `submitted` and flips the student's assignment.
/// Runs on the caller's transaction: nothing is visible until it commits,
/// and any error leaves the attempt in progress.
pub async fn finalize_attempt(
    conn: &mut PgConnection,
    attempt: &Attempt,
    exam: &Exam,
    rescore: Rescore,
    now: DateTime<Utc>,
) -> Result<GradeSummary, AppError> {
    if rescore == Rescore::FromQuestionBank {
        sqlx::query(
            r#"
            UPDATE responses r
            SET is_correct = o.is_correct,
                marks_awarded = CASE WHEN o.is_correct THEN eq.marks ELSE 0 END
            FROM question_options o, exam_questions eq
            WHERE r.attempt_id = $1
              AND o.id = r.selected_option_id
              AND eq.exam_id = $2
              AND eq.question_id = r.question_id
            "#,
        )
        .bind(attempt.id)
        .bind(exam.id)
        .execute(&mut *conn)
        .await?;
    }

    let total_score = sqlx::query_scalar::<_, Decimal>(
        "SELECT COALESCE(SUM(marks_awarded), 0) FROM responses WHERE attempt_id = $1",
    )
    .bind(attempt.id)
    .fetch_one(&mut *conn)
    .await?;

    let percentage = percentage(total_score, exam.total_score);
    let time_taken_seconds = attempt.time_taken(now);

    // Guarded by status so an overlapping submit cannot score twice.
    let updated = sqlx::query(
        r#"
        UPDATE attempts
        SET status = 'submitted',
            submitted_at = $2,
            total_score = $3,
            percentage = $4,
            time_taken_seconds = $5
        WHERE id = $1 AND status = 'in_progress'
        "#,
    )
    .bind(attempt.id)
    .bind(now)
    .bind(total_score)
    .bind(percentage)
    .bind(time_taken_seconds)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() != 1 {
        return Err(AppError::InvalidState(
            "Attempt has already been submitted".to_string(),
        ));
    }

    let flipped = sqlx::query(
        r#"
        UPDATE assignments
        SET has_submitted = TRUE, submitted_at = $3
        WHERE exam_id = $1 AND student_id = $2 AND has_submitted = FALSE
        "#,
    )
    .bind(attempt.exam_id)
    .bind(attempt.student_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if flipped.rows_affected() == 0 {
        tracing::warn!(
            attempt_id = attempt.id,
            exam_id = attempt.exam_id,
            student_id = attempt.student_id,
            "Assignment was missing or already marked submitted"
        );
    }

    Ok(GradeSummary {
        attempt_id: attempt.id,
        total_score,
        exam_total_score: exam.total_score,
        percentage,
        grade: Grade::from_percentage(percentage),
        time_taken_seconds,
        submitted_at: now,
    })
}
