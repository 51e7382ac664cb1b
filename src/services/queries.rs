// src/services/queries.rs

//! Row lookups shared by the exam, attempt and grading handlers.
//! Everything takes a `PgConnection` so it runs equally on a pooled
//! connection or inside an open transaction.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    error::AppError,
    models::{
        assignment::Assignment,
        attempt::{ATTEMPT_COLUMNS, Attempt},
        exam::{EXAM_COLUMNS, Exam, ExamQuestion},
        question::{BankQuestion, OptionKey, Question, QuestionOption},
    },
    utils::marks::distribute_marks,
};

pub async fn fetch_exam(conn: &mut PgConnection, exam_id: i64) -> Result<Exam, AppError> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {EXAM_COLUMNS} FROM exams WHERE id = $1"))
        .bind(exam_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))
}

/// Loads an exam and row-locks it until the surrounding transaction ends.
pub async fn lock_exam(conn: &mut PgConnection, exam_id: i64) -> Result<Exam, AppError> {
    sqlx::query_as::<_, Exam>(&format!(
        "SELECT {EXAM_COLUMNS} FROM exams WHERE id = $1 FOR UPDATE"
    ))
    .bind(exam_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Exam not found".to_string()))
}

pub async fn fetch_attempt(conn: &mut PgConnection, attempt_id: i64) -> Result<Attempt, AppError> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1"
    ))
    .bind(attempt_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))
}

/// Exclusive lock: used by submission and grading so overlapping requests
/// for the same attempt run one after the other.
pub async fn lock_attempt(conn: &mut PgConnection, attempt_id: i64) -> Result<Attempt, AppError> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1 FOR UPDATE"
    ))
    .bind(attempt_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))
}

/// Shared lock: answer saves do not block each other, but they do wait
/// for (and are blocked by) a submission holding the exclusive lock.
pub async fn share_lock_attempt(
    conn: &mut PgConnection,
    attempt_id: i64,
) -> Result<Attempt, AppError> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1 FOR SHARE"
    ))
    .bind(attempt_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))
}

pub async fn fetch_in_progress_attempt(
    conn: &mut PgConnection,
    exam_id: i64,
    student_id: i64,
) -> Result<Option<Attempt>, AppError> {
    let attempt = sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM attempts
         WHERE exam_id = $1 AND student_id = $2 AND status = 'in_progress'"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(attempt)
}

pub async fn fetch_latest_submitted_attempt(
    conn: &mut PgConnection,
    exam_id: i64,
    student_id: i64,
) -> Result<Option<Attempt>, AppError> {
    let attempt = sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM attempts
         WHERE exam_id = $1 AND student_id = $2 AND status = 'submitted'
         ORDER BY attempt_number DESC
         LIMIT 1"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(attempt)
}

pub async fn fetch_assignment(
    conn: &mut PgConnection,
    exam_id: i64,
    student_id: i64,
) -> Result<Option<Assignment>, AppError> {
    let assignment = sqlx::query_as::<_, Assignment>(
        "SELECT exam_id, student_id, has_submitted, assigned_at, submitted_at
         FROM assignments
         WHERE exam_id = $1 AND student_id = $2",
    )
    .bind(exam_id)
    .bind(student_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(assignment)
}

/// Locks the student's assignment row. Attempt creation holds it so two
/// concurrent starts for the same student run one after the other.
pub async fn lock_assignment(
    conn: &mut PgConnection,
    exam_id: i64,
    student_id: i64,
) -> Result<Option<Assignment>, AppError> {
    let assignment = sqlx::query_as::<_, Assignment>(
        "SELECT exam_id, student_id, has_submitted, assigned_at, submitted_at
         FROM assignments
         WHERE exam_id = $1 AND student_id = $2
         FOR UPDATE",
    )
    .bind(exam_id)
    .bind(student_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(assignment)
}

pub async fn fetch_exam_questions(
    conn: &mut PgConnection,
    exam_id: i64,
) -> Result<Vec<ExamQuestion>, AppError> {
    let rows = sqlx::query_as::<_, ExamQuestion>(
        "SELECT exam_id, question_id, position, marks
         FROM exam_questions
         WHERE exam_id = $1
         ORDER BY position",
    )
    .bind(exam_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

pub async fn count_exam_questions(conn: &mut PgConnection, exam_id: i64) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM exam_questions WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Returns (assigned, submitted) counts for an exam.
pub async fn count_assignments(
    conn: &mut PgConnection,
    exam_id: i64,
) -> Result<(i64, i64), AppError> {
    let counts = sqlx::query_as::<_, (i64, i64)>(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE has_submitted)
         FROM assignments
         WHERE exam_id = $1",
    )
    .bind(exam_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(counts)
}

/// Re-derives every question's marks from the exam total, keeping the
/// stored order. Must run whenever the question set or total changes.
pub async fn redistribute_marks(
    conn: &mut PgConnection,
    exam_id: i64,
    total_score: Decimal,
) -> Result<Vec<ExamQuestion>, AppError> {
    let questions = fetch_exam_questions(&mut *conn, exam_id).await?;
    let marks = distribute_marks(total_score, questions.len());

    let mut updated = Vec::with_capacity(questions.len());
    for (mut question, mark) in questions.into_iter().zip(marks) {
        sqlx::query("UPDATE exam_questions SET marks = $1 WHERE exam_id = $2 AND question_id = $3")
            .bind(mark)
            .bind(exam_id)
            .bind(question.question_id)
            .execute(&mut *conn)
            .await?;
        question.marks = mark;
        updated.push(question);
    }
    Ok(updated)
}

/// Question bank read: an exam's questions with their options, in the
/// exam's stored order, each carrying the marks it is worth in this exam.
pub async fn fetch_bank_questions(
    conn: &mut PgConnection,
    exam_id: i64,
) -> Result<Vec<BankQuestion>, AppError> {
    let rows = sqlx::query_as::<_, (i64, String, String, Decimal)>(
        r#"
        SELECT q.id, q.type, q.content, eq.marks
        FROM exam_questions eq
        JOIN questions q ON q.id = eq.question_id
        WHERE eq.exam_id = $1
        ORDER BY eq.position
        "#,
    )
    .bind(exam_id)
    .fetch_all(&mut *conn)
    .await?;

    let options = sqlx::query_as::<_, QuestionOption>(
        r#"
        SELECT o.id, o.question_id, o.content, o.is_correct, o.position
        FROM question_options o
        JOIN exam_questions eq ON eq.question_id = o.question_id
        WHERE eq.exam_id = $1
        ORDER BY o.question_id, o.position, o.id
        "#,
    )
    .bind(exam_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_question: HashMap<i64, Vec<QuestionOption>> = HashMap::new();
    for option in options {
        by_question.entry(option.question_id).or_default().push(option);
    }

    Ok(rows
        .into_iter()
        .map(|(id, question_type, content, marks)| BankQuestion {
            options: by_question.remove(&id).unwrap_or_default(),
            question: Question {
                id,
                question_type,
                content,
            },
            marks,
        })
        .collect())
}

/// Question bank read: correctness of one option.
pub async fn fetch_option(
    conn: &mut PgConnection,
    option_id: i64,
) -> Result<Option<OptionKey>, AppError> {
    let option = sqlx::query_as::<_, OptionKey>(
        "SELECT id, question_id, is_correct FROM question_options WHERE id = $1",
    )
    .bind(option_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(option)
}
