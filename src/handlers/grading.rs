// src/handlers/grading.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{attempt::AttemptStatus, report_card::PropagationResponse},
    services::{
        grading::{Rescore, finalize_attempt},
        queries::{fetch_attempt, fetch_exam, lock_attempt},
        report_card::{FollowUp, PropagationInput, ReportCardStore, follow_up, propagate},
    },
    utils::jwt::Claims,
};

/// Grades an attempt that was never submitted (deferred grading).
///
/// Correctness is re-read from the question bank's current answer key, so
/// corrections made since the answers were saved are honoured. An attempt
/// that is already submitted has a grade and is rejected with a conflict.
pub async fn grade_attempt(
    State(pool): State<PgPool>,
    State(store): State<Arc<dyn ReportCardStore>>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    let attempt = lock_attempt(&mut tx, attempt_id).await?;
    let exam = fetch_exam(&mut tx, attempt.exam_id).await?;
    exam.ensure_tenant(claims.tenant_id)?;

    if attempt.status == AttemptStatus::Submitted {
        return Err(AppError::Conflict(
            "Attempt has already been graded".to_string(),
        ));
    }

    let summary = finalize_attempt(&mut tx, &attempt, &exam, Rescore::FromQuestionBank, now).await?;

    tx.commit().await?;

    tracing::info!(
        attempt_id,
        exam_id = exam.id,
        student_id = attempt.student_id,
        total_score = %summary.total_score,
        percentage = %summary.percentage,
        graded_by = %claims.sub,
        action = "attempt_grade",
        "Attempt graded"
    );

    let outcome = if exam.auto_update_report_card {
        let input = PropagationInput::for_attempt(&attempt, &exam, summary.total_score);
        follow_up(store.as_ref(), &input).await
    } else {
        FollowUp::default()
    };

    Ok(Json(summary.into_result(outcome, "Attempt graded successfully")))
}

/// Pushes a graded attempt's score into the student's report card.
///
/// Unlike the automatic push after grading, failures here are returned
/// to the caller. Repeating the call rewrites the same slot.
pub async fn push_to_report_card(
    State(pool): State<PgPool>,
    State(store): State<Arc<dyn ReportCardStore>>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;

    let attempt = fetch_attempt(&mut conn, attempt_id).await?;
    let exam = fetch_exam(&mut conn, attempt.exam_id).await?;
    exam.ensure_tenant(claims.tenant_id)?;

    // Release the connection before the store takes its own.
    drop(conn);

    let input = PropagationInput::from_graded(&attempt, &exam)?;
    let record = propagate(store.as_ref(), &input).await?;

    Ok(Json(PropagationResponse {
        attempt_id,
        slot: input.slot,
        score: input.score,
        record,
    }))
}
