// src/handlers/attempt.rs

use std::{collections::HashMap, sync::Arc};

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::{
        attempt::{
            ATTEMPT_COLUMNS, Attempt, ExamResults, QuestionBreakdown, ResultsParams,
            SaveAnswerRequest, StartAttemptResponse, SubmitAttemptRequest,
        },
        question::{BankQuestion, PresentedQuestion, PublicOption},
    },
    services::{
        grading::{Rescore, finalize_attempt},
        queries::{
            fetch_assignment, fetch_bank_questions, fetch_exam, fetch_in_progress_attempt,
            fetch_latest_submitted_attempt, lock_assignment, lock_attempt, share_lock_attempt,
        },
        report_card::{FollowUp, PropagationInput, ReportCardStore, follow_up},
        responses::{AnswerOutcome, record_answer},
    },
    utils::{
        grading::Grade,
        jwt::{Claims, ROLE_STUDENT},
        presentation::{PresentationConfig, new_seed, presentation_order},
    },
};

/// Attempts are taken by students only; returns the caller's user id.
fn require_student(claims: &Claims) -> Result<i64, AppError> {
    if claims.role != ROLE_STUDENT {
        return Err(AppError::Forbidden(
            "Only students can take exams".to_string(),
        ));
    }
    claims.user_id()
}

/// Starts an attempt, or resumes the one already in progress.
///
/// * The exam must be published and the caller assigned to it.
/// * A new attempt also requires the availability window to be open.
/// * Calling twice returns the same attempt with the same presentation order.
pub async fn start_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = require_student(&claims)?;
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    let exam = fetch_exam(&mut tx, exam_id).await?;
    exam.ensure_tenant(claims.tenant_id)?;

    if !exam.is_published {
        return Err(AppError::InvalidState("Exam is not published".to_string()));
    }

    let assignment = lock_assignment(&mut tx, exam_id, student_id)
        .await?
        .ok_or(AppError::Forbidden(
            "You are not assigned to this exam".to_string(),
        ))?;

    if assignment.has_submitted {
        return Err(AppError::InvalidState(
            "You have already submitted this exam".to_string(),
        ));
    }

    let (attempt, resumed) = match fetch_in_progress_attempt(&mut tx, exam_id, student_id).await? {
        Some(attempt) => (attempt, true),
        None => {
            if !exam.is_open_at(now) {
                return Err(AppError::InvalidState(
                    "Exam is not open at this time".to_string(),
                ));
            }

            let attempt = sqlx::query_as::<_, Attempt>(&format!(
                r#"
                INSERT INTO attempts (exam_id, student_id, attempt_number, status, presentation_seed, started_at)
                SELECT $1, $2, COALESCE(MAX(attempt_number), 0) + 1, 'in_progress'::attempt_status, $3, $4
                FROM attempts
                WHERE exam_id = $1 AND student_id = $2
                RETURNING {ATTEMPT_COLUMNS}
                "#
            ))
            .bind(exam_id)
            .bind(student_id)
            .bind(new_seed())
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict("An attempt is already in progress".to_string())
                } else {
                    AppError::from(e)
                }
            })?;

            (attempt, false)
        }
    };

    tx.commit().await?;

    if resumed {
        tracing::info!(
            attempt_id = attempt.id,
            exam_id,
            student_id,
            action = "attempt_resume",
            "Attempt resumed"
        );
    } else {
        tracing::info!(
            attempt_id = attempt.id,
            exam_id,
            student_id,
            attempt_number = attempt.attempt_number,
            action = "attempt_start",
            "Attempt started"
        );
    }

    let mut conn = pool.acquire().await?;

    let bank = fetch_bank_questions(&mut conn, exam_id).await?;
    let questions = present_questions(bank, attempt.presentation_seed, exam.presentation_config());

    let saved_answers: HashMap<i64, i64> = sqlx::query_as::<_, (i64, i64)>(
        "SELECT question_id, selected_option_id FROM responses WHERE attempt_id = $1",
    )
    .bind(attempt.id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .collect();

    let status = if resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(StartAttemptResponse {
            attempt_id: attempt.id,
            exam_id,
            attempt_number: attempt.attempt_number,
            status: attempt.status,
            resumed,
            started_at: attempt.started_at,
            deadline: attempt.deadline(&exam),
            remaining_seconds: attempt.remaining_seconds(&exam, now),
            questions,
            saved_answers,
        }),
    ))
}

/// Orders the exam's questions and options for one attempt and strips
/// correctness from what the student sees.
fn present_questions(
    bank: Vec<BankQuestion>,
    seed: i64,
    config: PresentationConfig,
) -> Vec<PresentedQuestion> {
    let option_counts: Vec<usize> = bank.iter().map(|q| q.options.len()).collect();
    let order = presentation_order(seed, config, &option_counts);

    order
        .into_iter()
        .map(|slot| {
            let entry = &bank[slot.question];
            PresentedQuestion {
                id: entry.question.id,
                question_type: entry.question.question_type.clone(),
                content: entry.question.content.clone(),
                marks: entry.marks,
                options: slot
                    .options
                    .into_iter()
                    .map(|i| PublicOption {
                        id: entry.options[i].id,
                        content: entry.options[i].content.clone(),
                    })
                    .collect(),
            }
        })
        .collect()
}

/// Autosaves one answer of an in-progress attempt.
pub async fn save_answer(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let student_id = require_student(&claims)?;
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    let attempt = share_lock_attempt(&mut tx, attempt_id).await?;
    attempt.ensure_owned_by(student_id)?;
    attempt.ensure_in_progress()?;

    let exam = fetch_exam(&mut tx, attempt.exam_id).await?;
    if !attempt.accepts_answers_at(&exam, now, config.attempt_grace_seconds) {
        return Err(AppError::InvalidState(
            "Time is up for this attempt; submit it instead".to_string(),
        ));
    }

    let outcome = record_answer(
        &mut tx,
        &attempt,
        payload.question_id,
        payload.option_id,
        now,
    )
    .await?;

    tx.commit().await?;

    tracing::debug!(
        attempt_id,
        question_id = payload.question_id,
        outcome = ?outcome,
        "Answer recorded"
    );

    Ok(Json(serde_json::json!({
        "attempt_id": attempt_id,
        "question_id": payload.question_id,
        "saved": outcome == AnswerOutcome::Saved,
        "remaining_seconds": attempt.remaining_seconds(&exam, now),
    })))
}

/// Submits an attempt and grades it on the spot.
///
/// Inline answers are recorded first if the attempt is still within its
/// deadline (plus grace); late ones are dropped, but the submission itself
/// is always accepted. Everything up to the grade commits atomically.
pub async fn submit_attempt(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    State(store): State<Arc<dyn ReportCardStore>>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = require_student(&claims)?;
    let now = Utc::now();

    if payload.answers.iter().any(|(q, o)| *q <= 0 || *o < 0) {
        return Err(AppError::BadRequest(
            "Answers must map positive question ids to option ids".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let attempt = lock_attempt(&mut tx, attempt_id).await?;
    attempt.ensure_owned_by(student_id)?;
    attempt.ensure_in_progress()?;

    let exam = fetch_exam(&mut tx, attempt.exam_id).await?;

    if !payload.answers.is_empty() {
        if attempt.accepts_answers_at(&exam, now, config.attempt_grace_seconds) {
            let mut answers: Vec<(i64, i64)> = payload.answers.into_iter().collect();
            answers.sort_unstable();
            for (question_id, option_id) in answers {
                record_answer(&mut tx, &attempt, question_id, option_id, now).await?;
            }
        } else {
            tracing::warn!(
                attempt_id,
                dropped = payload.answers.len(),
                "Inline answers arrived after the deadline and were ignored"
            );
        }
    }

    let summary = finalize_attempt(&mut tx, &attempt, &exam, Rescore::Keep, now).await?;

    tx.commit().await?;

    tracing::info!(
        attempt_id,
        exam_id = exam.id,
        student_id,
        total_score = %summary.total_score,
        percentage = %summary.percentage,
        action = "attempt_submit",
        "Attempt submitted"
    );

    let outcome = if exam.auto_update_report_card {
        let input = PropagationInput::for_attempt(&attempt, &exam, summary.total_score);
        follow_up(store.as_ref(), &input).await
    } else {
        FollowUp::default()
    };

    Ok(Json(
        summary.into_result(outcome, "Exam submitted successfully"),
    ))
}

/// Results of a student's latest submitted attempt.
///
/// Students may only ask about themselves; staff must name the student.
/// The per-question breakdown is shown to staff always, and to students
/// only when the exam shows results immediately.
pub async fn get_results(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
    Query(params): Query<ResultsParams>,
) -> Result<impl IntoResponse, AppError> {
    let caller_id = claims.user_id()?;
    let is_staff = claims.is_staff();

    let student_id = if is_staff {
        params.student_id.ok_or(AppError::BadRequest(
            "student_id is required".to_string(),
        ))?
    } else {
        match params.student_id {
            Some(id) if id != caller_id => {
                return Err(AppError::Forbidden(
                    "You can only view your own results".to_string(),
                ));
            }
            _ => caller_id,
        }
    };

    let mut conn = pool.acquire().await?;

    let exam = fetch_exam(&mut conn, exam_id).await?;
    exam.ensure_tenant(claims.tenant_id)?;

    let assignment = fetch_assignment(&mut conn, exam_id, student_id)
        .await?
        .ok_or(AppError::Forbidden(
            "Student is not assigned to this exam".to_string(),
        ))?;

    if !assignment.has_submitted {
        return Err(AppError::InvalidState(
            "Results are available once the exam is submitted".to_string(),
        ));
    }

    let attempt = fetch_latest_submitted_attempt(&mut conn, exam_id, student_id)
        .await?
        .ok_or(AppError::NotFound(
            "No submitted attempt found".to_string(),
        ))?;

    let breakdown = if exam.show_results_immediately || is_staff {
        let rows = sqlx::query_as::<_, QuestionBreakdown>(
            r#"
            SELECT
                eq.question_id,
                eq.position,
                q.content,
                r.selected_option_id,
                (
                    SELECT o.id FROM question_options o
                    WHERE o.question_id = eq.question_id AND o.is_correct
                    ORDER BY o.position, o.id
                    LIMIT 1
                ) AS correct_option_id,
                COALESCE(r.is_correct, FALSE) AS is_correct,
                COALESCE(r.marks_awarded, 0) AS marks_awarded,
                eq.marks AS question_marks
            FROM exam_questions eq
            JOIN questions q ON q.id = eq.question_id
            LEFT JOIN responses r ON r.question_id = eq.question_id AND r.attempt_id = $2
            WHERE eq.exam_id = $1
            ORDER BY eq.position
            "#,
        )
        .bind(exam_id)
        .bind(attempt.id)
        .fetch_all(&mut *conn)
        .await?;
        Some(rows)
    } else {
        None
    };

    let total_score = attempt.total_score.unwrap_or_default();
    let percentage = attempt.percentage.unwrap_or_default();

    Ok(Json(ExamResults {
        exam_id,
        student_id,
        attempt_id: attempt.id,
        total_score,
        exam_total_score: exam.total_score,
        percentage,
        grade: Grade::from_percentage(percentage),
        submitted_at: attempt.submitted_at,
        time_taken_seconds: attempt.time_taken_seconds,
        breakdown,
    }))
}
