// src/services/report_card.rs

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, AttemptStatus},
        exam::Exam,
        report_card::{ReportCardKey, ReportCardSubject, ReportSlot},
    },
};

/// Write access to the academic report card, which the engine does not own.
#[async_trait]
pub trait ReportCardStore: Send + Sync {
    /// Overwrites the input's slot on the subject row for its key, creating a
    /// zeroed row if needed, and records the attempt as pushed.
    ///
    /// One unit of work: concurrent writes to the other slot of the same row
    /// are never lost.
    async fn apply(&self, input: &PropagationInput) -> Result<ReportCardSubject, AppError>;
}

pub struct PgReportCardStore {
    pool: PgPool,
}

impl PgReportCardStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportCardStore for PgReportCardStore {
    async fn apply(&self, input: &PropagationInput) -> Result<ReportCardSubject, AppError> {
        let key = &input.key;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO report_card_subjects (tenant_id, student_id, subject, session, term)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, student_id, subject, session, term) DO NOTHING
            "#,
        )
        .bind(key.tenant_id)
        .bind(key.student_id)
        .bind(&key.subject)
        .bind(&key.session)
        .bind(&key.term)
        .execute(&mut *tx)
        .await?;

        // Held until commit so the other slot is read fresh.
        let mut record = sqlx::query_as::<_, ReportCardSubject>(
            r#"
            SELECT id, tenant_id, student_id, subject, session, term, ca, exam, total, grade, remark
            FROM report_card_subjects
            WHERE tenant_id = $1 AND student_id = $2 AND subject = $3 AND session = $4 AND term = $5
            FOR UPDATE
            "#,
        )
        .bind(key.tenant_id)
        .bind(key.student_id)
        .bind(&key.subject)
        .bind(&key.session)
        .bind(&key.term)
        .fetch_one(&mut *tx)
        .await?;

        record.apply_score(input.slot, input.score);

        sqlx::query(
            r#"
            UPDATE report_card_subjects
            SET ca = $2, exam = $3, total = $4, grade = $5, remark = $6, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.ca)
        .bind(record.exam)
        .bind(record.total)
        .bind(&record.grade)
        .bind(&record.remark)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE attempts SET pushed_to_report_card = TRUE, pushed_at = $2 WHERE id = $1")
            .bind(input.attempt_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(record)
    }
}

/// Everything propagation needs to know about a graded attempt.
#[derive(Debug, Clone)]
pub struct PropagationInput {
    pub attempt_id: i64,
    pub key: ReportCardKey,
    pub slot: ReportSlot,
    pub score: Decimal,
}

impl PropagationInput {
    pub fn for_attempt(attempt: &Attempt, exam: &Exam, score: Decimal) -> Self {
        Self {
            attempt_id: attempt.id,
            key: ReportCardKey {
                tenant_id: exam.tenant_id,
                student_id: attempt.student_id,
                subject: exam.subject.clone(),
                session: exam.session.clone(),
                term: exam.term.clone(),
            },
            slot: ReportSlot::for_assessment_type(&exam.assessment_type),
            score,
        }
    }

    /// Input for an attempt that has already been graded.
    pub fn from_graded(attempt: &Attempt, exam: &Exam) -> Result<Self, AppError> {
        if attempt.status != AttemptStatus::Submitted {
            return Err(AppError::InvalidState(
                "Only submitted attempts can be pushed to the report card".to_string(),
            ));
        }
        let score = attempt.total_score.unwrap_or(Decimal::ZERO);
        Ok(Self::for_attempt(attempt, exam, score))
    }
}

/// Writes the score into its slot, overwriting whatever was there, and
/// stamps the attempt as pushed.
pub async fn propagate(
    store: &dyn ReportCardStore,
    input: &PropagationInput,
) -> Result<ReportCardSubject, AppError> {
    let record = store.apply(input).await?;

    tracing::info!(
        attempt_id = input.attempt_id,
        student_id = input.key.student_id,
        subject = %input.key.subject,
        slot = ?input.slot,
        score = %input.score,
        action = "report_card_push",
        "Score pushed to report card"
    );

    Ok(record)
}

/// Result of the best-effort push that follows a committed grading.
#[derive(Debug, Clone, Default)]
pub struct FollowUp {
    pub updated: bool,
    pub error: Option<String>,
}

/// Runs propagation after the grading transaction has committed.
///
/// Failure is reported, never raised: the grade stands either way.
pub async fn follow_up(store: &dyn ReportCardStore, input: &PropagationInput) -> FollowUp {
    match propagate(store, input).await {
        Ok(_) => FollowUp {
            updated: true,
            error: None,
        },
        Err(e) => {
            tracing::warn!(
                attempt_id = input.attempt_id,
                error = %e,
                "Report card propagation failed; grade kept"
            );
            FollowUp {
                updated: false,
                error: Some(e.to_string()),
            }
        }
    }
}
