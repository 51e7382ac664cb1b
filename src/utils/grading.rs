// src/utils/grading.rs

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Letter grade derived from a percentage.
///
/// The same table drives attempt results and report card propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Grade {
    pub fn from_percentage(percentage: Decimal) -> Self {
        if percentage >= Decimal::from(80) {
            Grade::A
        } else if percentage >= Decimal::from(70) {
            Grade::B
        } else if percentage >= Decimal::from(60) {
            Grade::C
        } else if percentage >= Decimal::from(50) {
            Grade::D
        } else if percentage >= Decimal::from(40) {
            Grade::E
        } else {
            Grade::F
        }
    }

    pub fn letter(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
            Grade::F => "F",
        }
    }

    pub fn remark(self) -> &'static str {
        match self {
            Grade::A => "EXCELLENT",
            Grade::B => "VERY GOOD",
            Grade::C => "GOOD",
            Grade::D => "FAIR",
            Grade::E => "PASS",
            Grade::F => "FAIL",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

/// `score / out_of * 100`, rounded half away from zero to two places.
/// An exam worth nothing scores 0%.
pub fn percentage(score: Decimal, out_of: Decimal) -> Decimal {
    if out_of <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (score / out_of * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Marks a single response earns.
pub fn award_marks(is_correct: bool, question_marks: Decimal) -> Decimal {
    if is_correct {
        question_marks
    } else {
        Decimal::ZERO
    }
}
