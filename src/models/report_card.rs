// src/models/report_card.rs

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use crate::{config::EXAM_ASSESSMENT_TYPE, utils::grading::Grade};

/// Which score column of a report card subject a CBT result lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSlot {
    /// Continuous assessment. Every label other than "exam" shares it.
    Ca,
    /// Terminal exam.
    Exam,
}

impl ReportSlot {
    pub fn for_assessment_type(assessment_type: &str) -> Self {
        if assessment_type == EXAM_ASSESSMENT_TYPE {
            ReportSlot::Exam
        } else {
            ReportSlot::Ca
        }
    }
}

/// Natural key of a report card subject row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportCardKey {
    pub tenant_id: i64,
    pub student_id: i64,
    pub subject: String,
    pub session: String,
    pub term: String,
}

/// Represents the 'report_card_subjects' table. Owned by report card
/// management; the engine only writes the score columns.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReportCardSubject {
    pub id: i64,
    pub tenant_id: i64,
    pub student_id: i64,
    pub subject: String,
    pub session: String,
    pub term: String,
    pub ca: Decimal,
    pub exam: Decimal,
    pub total: Decimal,
    pub grade: String,
    pub remark: String,
}

impl ReportCardSubject {
    /// Overwrites one slot and recomputes the derived columns.
    ///
    /// `ca + exam` is already on a 0-100 scale, so it doubles as the
    /// percentage that picks the grade.
    pub fn apply_score(&mut self, slot: ReportSlot, score: Decimal) {
        match slot {
            ReportSlot::Ca => self.ca = score,
            ReportSlot::Exam => self.exam = score,
        }
        self.total = self.ca + self.exam;

        let percentage = self.total.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        let grade = Grade::from_percentage(percentage);
        self.grade = grade.letter().to_string();
        self.remark = grade.remark().to_string();
    }
}

/// Returned by a manual propagation.
#[derive(Debug, Serialize)]
pub struct PropagationResponse {
    pub attempt_id: i64,
    pub slot: ReportSlot,
    pub score: Decimal,
    pub record: ReportCardSubject,
}
