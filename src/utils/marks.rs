// src/utils/marks.rs

use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};

/// Splits an exam's `total_score` across `count` questions.
///
/// Every question gets `floor(total / count * 100) / 100`. Whatever that
/// truncation leaves over goes to the last question, so the marks always sum
/// to `total` exactly. The share is computed in `f64`; existing stored marks
/// depend on that exact truncation.
pub fn distribute_marks(total: Decimal, count: usize) -> Vec<Decimal> {
    if count == 0 {
        return Vec::new();
    }

    let total_f = total.to_f64().unwrap_or(0.0);
    let share = ((total_f / count as f64) * 100.0).floor() / 100.0;
    let per_question = Decimal::from_f64(share)
        .unwrap_or(Decimal::ZERO)
        .round_dp(2);

    let mut marks = vec![per_question; count];
    let remainder = total - per_question * Decimal::from(count as u64);
    if let Some(last) = marks.last_mut() {
        *last += remainder;
    }
    marks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn remainder_goes_to_last_question() {
        let marks = distribute_marks(d("10"), 3);
        assert_eq!(marks, vec![d("3.33"), d("3.33"), d("3.34")]);
        assert_eq!(marks.iter().sum::<Decimal>(), d("10"));
    }

    #[test]
    fn even_split_has_no_remainder() {
        let marks = distribute_marks(d("20"), 4);
        assert_eq!(marks, vec![d("5"), d("5"), d("5"), d("5")]);
    }

    #[test]
    fn single_question_takes_everything() {
        assert_eq!(distribute_marks(d("7.5"), 1), vec![d("7.5")]);
    }

    #[test]
    fn no_questions_no_marks() {
        assert!(distribute_marks(d("10"), 0).is_empty());
    }

    #[test]
    fn zero_total_gives_zero_marks() {
        let marks = distribute_marks(Decimal::ZERO, 3);
        assert!(marks.iter().all(|m| m.is_zero()));
    }

    #[test]
    fn share_is_floored_not_rounded() {
        // 2 / 3 = 0.666.. floors to 0.66, leaving 0.02 for the last question.
        let marks = distribute_marks(d("2"), 3);
        assert_eq!(marks, vec![d("0.66"), d("0.66"), d("0.68")]);
    }

    #[test]
    fn sum_invariant_holds_for_awkward_totals() {
        for total in ["10", "7", "100", "33.33", "0.05", "1", "12.5"] {
            for count in 1..=17 {
                let marks = distribute_marks(d(total), count);
                assert_eq!(marks.len(), count);
                assert_eq!(
                    marks.iter().sum::<Decimal>(),
                    d(total),
                    "total {} over {} questions",
                    total,
                    count
                );
                // Everything but the last question shares one value.
                assert!(marks[..count - 1].windows(2).all(|w| w[0] == w[1]));
            }
        }
    }

    #[test]
    fn more_questions_than_cents() {
        // 0.05 over 7 floors to 0.00 each; the last question carries it all.
        let marks = distribute_marks(d("0.05"), 7);
        assert!(marks[..6].iter().all(|m| m.is_zero()));
        assert_eq!(marks[6], d("0.05"));
    }
}
