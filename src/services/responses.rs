// src/services/responses.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    error::AppError,
    models::attempt::Attempt,
    services::queries::fetch_option,
    utils::grading::award_marks,
};

/// What happened to a single answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Saved,
    Cleared,
}

/// Upserts the response for one question of an in-progress attempt.
///
/// Correctness and marks are resolved now, against the option's current
/// flag and the question's marks in this exam, so the stored row is always
/// gradeable as-is. `option_id == 0` removes any saved answer instead.
pub async fn record_answer(
    conn: &mut PgConnection,
    attempt: &Attempt,
    question_id: i64,
    option_id: i64,
    now: DateTime<Utc>,
) -> Result<AnswerOutcome, AppError> {
    let question_marks = sqlx::query_scalar::<_, Decimal>(
        "SELECT marks FROM exam_questions WHERE exam_id = $1 AND question_id = $2",
    )
    .bind(attempt.exam_id)
    .bind(question_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::BadRequest(format!(
        "Question {} is not part of this exam",
        question_id
    )))?;

    if option_id == 0 {
        sqlx::query("DELETE FROM responses WHERE attempt_id = $1 AND question_id = $2")
            .bind(attempt.id)
            .bind(question_id)
            .execute(&mut *conn)
            .await?;
        return Ok(AnswerOutcome::Cleared);
    }

    let option = fetch_option(&mut *conn, option_id)
        .await?
        .ok_or(AppError::NotFound(format!("Option {} not found", option_id)))?;

    if option.question_id != question_id {
        return Err(AppError::BadRequest(format!(
            "Option {} does not belong to question {}",
            option_id, question_id
        )));
    }

    let marks_awarded = award_marks(option.is_correct, question_marks);

    sqlx::query(
        r#"
        INSERT INTO responses (attempt_id, question_id, selected_option_id, is_correct, marks_awarded, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (attempt_id, question_id) DO UPDATE SET
            selected_option_id = EXCLUDED.selected_option_id,
            is_correct = EXCLUDED.is_correct,
            marks_awarded = EXCLUDED.marks_awarded,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(attempt.id)
    .bind(question_id)
    .bind(option.id)
    .bind(option.is_correct)
    .bind(marks_awarded)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(AnswerOutcome::Saved)
}
