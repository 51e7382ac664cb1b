// src/handlers/exam.rs

use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    config::DEFAULT_TOTAL_SCORE,
    error::AppError,
    models::exam::{
        AssignStudentsRequest, CreateExamRequest, EXAM_COLUMNS, Exam, ExamDetail,
        SetQuestionsRequest, UpdateExamRequest, resolve_window, validate_total_score,
    },
    services::queries::{
        count_assignments, count_exam_questions, fetch_exam, fetch_exam_questions, lock_exam,
        redistribute_marks,
    },
    utils::{jwt::Claims, marks::distribute_marks},
};

/// Creates a draft exam.
///
/// * All labels (title, subject, class, session, term, assessment type) must be non-blank.
/// * A missing window defaults to "open now, for a week".
/// * `total_score` defaults to 10.
pub async fn create_exam(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let now = Utc::now();
    let (start_at, end_at) = resolve_window(payload.start_at, payload.end_at, now)?;
    let total_score = payload
        .total_score
        .unwrap_or(Decimal::from(DEFAULT_TOTAL_SCORE));
    validate_total_score(total_score)?;

    let exam = sqlx::query_as::<_, Exam>(&format!(
        r#"
        INSERT INTO exams (
            tenant_id, created_by, title, subject, class_name, session, term, assessment_type,
            total_score, duration_minutes, start_at, end_at, shuffle_questions, shuffle_options,
            show_results_immediately, auto_update_report_card
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        RETURNING {EXAM_COLUMNS}
        "#
    ))
    .bind(claims.tenant_id)
    .bind(user_id)
    .bind(payload.title.trim())
    .bind(payload.subject.trim())
    .bind(payload.class_name.trim())
    .bind(payload.session.trim())
    .bind(payload.term.trim())
    .bind(payload.assessment_type.trim())
    .bind(total_score)
    .bind(payload.duration_minutes)
    .bind(start_at)
    .bind(end_at)
    .bind(payload.shuffle_questions)
    .bind(payload.shuffle_options)
    .bind(payload.show_results_immediately)
    .bind(payload.auto_update_report_card)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create exam: {:?}", e);
        AppError::from(e)
    })?;

    tracing::info!(
        exam_id = exam.id,
        tenant_id = exam.tenant_id,
        instructor_id = user_id,
        action = "exam_create",
        "Exam created"
    );

    Ok((StatusCode::CREATED, Json(exam)))
}

/// Returns an exam with its question marks and assignment counts.
pub async fn get_exam(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;

    let exam = fetch_exam(&mut conn, exam_id).await?;
    exam.ensure_tenant(claims.tenant_id)?;

    let questions = fetch_exam_questions(&mut conn, exam_id).await?;
    let (assigned_count, submitted_count) = count_assignments(&mut conn, exam_id).await?;

    Ok(Json(ExamDetail {
        exam,
        questions,
        assigned_count,
        submitted_count,
    }))
}

/// Edits exam settings.
///
/// Timing and display flags may change at any time. `total_score` can only
/// change while the exam is a draft, and changing it re-derives question marks.
pub async fn update_exam(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
    Json(payload): Json<UpdateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;

    let exam = lock_exam(&mut tx, exam_id).await?;
    exam.ensure_tenant(claims.tenant_id)?;

    let start_at = payload.start_at.unwrap_or(exam.start_at);
    let end_at = payload.end_at.unwrap_or(exam.end_at);
    if end_at <= start_at {
        return Err(AppError::BadRequest(
            "end_at must be after start_at".to_string(),
        ));
    }

    let total_changed = match payload.total_score {
        Some(total) if total != exam.total_score => {
            validate_total_score(total)?;
            exam.ensure_draft("change the total score of")?;
            true
        }
        _ => false,
    };
    let total_score = payload.total_score.unwrap_or(exam.total_score);

    let updated = sqlx::query_as::<_, Exam>(&format!(
        r#"
        UPDATE exams SET
            title = $2,
            total_score = $3,
            duration_minutes = $4,
            start_at = $5,
            end_at = $6,
            shuffle_questions = $7,
            shuffle_options = $8,
            show_results_immediately = $9,
            auto_update_report_card = $10,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        RETURNING {EXAM_COLUMNS}
        "#
    ))
    .bind(exam_id)
    .bind(
        payload
            .title
            .as_deref()
            .map(str::trim)
            .unwrap_or(&exam.title),
    )
    .bind(total_score)
    .bind(payload.duration_minutes.unwrap_or(exam.duration_minutes))
    .bind(start_at)
    .bind(end_at)
    .bind(payload.shuffle_questions.unwrap_or(exam.shuffle_questions))
    .bind(payload.shuffle_options.unwrap_or(exam.shuffle_options))
    .bind(
        payload
            .show_results_immediately
            .unwrap_or(exam.show_results_immediately),
    )
    .bind(
        payload
            .auto_update_report_card
            .unwrap_or(exam.auto_update_report_card),
    )
    .fetch_one(&mut *tx)
    .await?;

    if total_changed {
        redistribute_marks(&mut tx, exam_id, total_score).await?;
    }

    tx.commit().await?;

    Ok(Json(updated))
}

/// Deletes a draft exam. Published exams are permanent.
pub async fn delete_exam(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let exam = lock_exam(&mut tx, exam_id).await?;
    exam.ensure_tenant(claims.tenant_id)?;

    if exam.is_published {
        return Err(AppError::Conflict(
            "Published exams cannot be deleted".to_string(),
        ));
    }

    sqlx::query("DELETE FROM exams WHERE id = $1")
        .bind(exam_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(exam_id, action = "exam_delete", "Exam deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Replaces the exam's question set and derives per-question marks.
///
/// The order given is the stored presentation order; the last question
/// absorbs the rounding remainder of the mark split.
pub async fn set_questions(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
    Json(payload): Json<SetQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut seen = HashSet::new();
    if let Some(dup) = payload.question_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(AppError::BadRequest(format!(
            "Question {} is listed more than once",
            dup
        )));
    }

    let mut tx = pool.begin().await?;

    let exam = lock_exam(&mut tx, exam_id).await?;
    exam.ensure_tenant(claims.tenant_id)?;
    exam.ensure_draft("change the questions of")?;

    if !payload.question_ids.is_empty() {
        let known: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM questions WHERE tenant_id = $1 AND id = ANY($2)")
                .bind(exam.tenant_id)
                .bind(&payload.question_ids)
                .fetch_all(&mut *tx)
                .await?;

        if known.len() != payload.question_ids.len() {
            let known: HashSet<i64> = known.into_iter().collect();
            let missing: Vec<String> = payload
                .question_ids
                .iter()
                .filter(|id| !known.contains(id))
                .map(|id| id.to_string())
                .collect();
            return Err(AppError::BadRequest(format!(
                "Unknown questions: {}",
                missing.join(", ")
            )));
        }
    }

    sqlx::query("DELETE FROM exam_questions WHERE exam_id = $1")
        .bind(exam_id)
        .execute(&mut *tx)
        .await?;

    let marks = distribute_marks(exam.total_score, payload.question_ids.len());

    if !payload.question_ids.is_empty() {
        let mut query_builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO exam_questions (exam_id, question_id, position, marks) ",
        );
        query_builder.push_values(
            payload.question_ids.iter().zip(&marks).enumerate(),
            |mut row, (index, (question_id, mark))| {
                row.push_bind(exam_id)
                    .push_bind(*question_id)
                    .push_bind(index as i32 + 1)
                    .push_bind(*mark);
            },
        );
        query_builder.build().execute(&mut *tx).await?;
    }

    sqlx::query("UPDATE exams SET updated_at = CURRENT_TIMESTAMP WHERE id = $1")
        .bind(exam_id)
        .execute(&mut *tx)
        .await?;

    let questions = fetch_exam_questions(&mut tx, exam_id).await?;

    tx.commit().await?;

    tracing::info!(
        exam_id,
        question_count = questions.len(),
        total_score = %exam.total_score,
        action = "exam_set_questions",
        "Exam questions replaced"
    );

    Ok(Json(questions))
}

/// Makes students eligible to sit the exam. Already-assigned students are
/// left untouched, so the call is safe to repeat.
pub async fn assign_students(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
    Json(payload): Json<AssignStudentsRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if payload.student_ids.iter().any(|id| *id <= 0) {
        return Err(AppError::BadRequest(
            "Student ids must be positive".to_string(),
        ));
    }

    let mut conn = pool.acquire().await?;

    let exam = fetch_exam(&mut conn, exam_id).await?;
    exam.ensure_tenant(claims.tenant_id)?;

    let mut query_builder =
        QueryBuilder::<Postgres>::new("INSERT INTO assignments (exam_id, student_id) ");
    query_builder.push_values(payload.student_ids.iter(), |mut row, student_id| {
        row.push_bind(exam_id).push_bind(*student_id);
    });
    query_builder.push(" ON CONFLICT (exam_id, student_id) DO NOTHING");

    let result = query_builder.build().execute(&mut *conn).await?;
    let (assigned_count, _) = count_assignments(&mut conn, exam_id).await?;

    tracing::info!(
        exam_id,
        newly_assigned = result.rows_affected(),
        action = "exam_assign",
        "Students assigned"
    );

    Ok(Json(serde_json::json!({
        "newly_assigned": result.rows_affected(),
        "assigned_count": assigned_count,
    })))
}

/// Publishes a draft exam. One-way: a published exam never returns to draft.
///
/// Requires at least one question and at least one assigned student.
pub async fn publish_exam(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let exam = lock_exam(&mut tx, exam_id).await?;
    exam.ensure_tenant(claims.tenant_id)?;

    if exam.is_published {
        return Err(AppError::InvalidState(
            "Exam is already published".to_string(),
        ));
    }

    let question_count = count_exam_questions(&mut tx, exam_id).await?;
    if question_count == 0 {
        return Err(AppError::BadRequest(
            "Exam must have at least one question before publishing".to_string(),
        ));
    }

    let (assigned_count, _) = count_assignments(&mut tx, exam_id).await?;
    if assigned_count == 0 {
        return Err(AppError::BadRequest(
            "Exam must have at least one assigned student before publishing".to_string(),
        ));
    }

    let published = sqlx::query_as::<_, Exam>(&format!(
        r#"
        UPDATE exams
        SET is_published = TRUE, published_at = $2, updated_at = $2
        WHERE id = $1 AND is_published = FALSE
        RETURNING {EXAM_COLUMNS}
        "#
    ))
    .bind(exam_id)
    .bind(Utc::now())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::InvalidState(
        "Exam is already published".to_string(),
    ))?;

    tx.commit().await?;

    tracing::info!(
        exam_id,
        question_count,
        assigned_count,
        action = "exam_publish",
        "Exam published"
    );

    Ok(Json(published))
}
