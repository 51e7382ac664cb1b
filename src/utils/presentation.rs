// src/utils/presentation.rs

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

/// Mixed into the seed for the question stream so option order does not
/// depend on whether questions are shuffled.
const QUESTION_STREAM: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy, Default)]
pub struct PresentationConfig {
    pub shuffle_questions: bool,
    pub shuffle_options: bool,
}

/// One presented question: index into the stored question list, and the
/// order of its options as indexes into that question's stored option list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedSlot {
    pub question: usize,
    pub options: Vec<usize>,
}

/// Fresh per-attempt seed.
pub fn new_seed() -> i64 {
    rand::random::<i64>()
}

/// Presentation order for an attempt.
///
/// A pure function of the attempt's stored seed, the exam's shuffle flags and
/// the option count of each stored question, so resuming an attempt shows the
/// same order it started with.
pub fn presentation_order(
    seed: i64,
    config: PresentationConfig,
    option_counts: &[usize],
) -> Vec<PresentedSlot> {
    let mut option_rng = StdRng::seed_from_u64(seed as u64);
    let mut question_rng = StdRng::seed_from_u64(seed as u64 ^ QUESTION_STREAM);

    let mut option_orders: Vec<Vec<usize>> = option_counts
        .iter()
        .map(|&count| {
            let mut order: Vec<usize> = (0..count).collect();
            if config.shuffle_options {
                order.shuffle(&mut option_rng);
            }
            order
        })
        .collect();

    let mut question_order: Vec<usize> = (0..option_counts.len()).collect();
    if config.shuffle_questions {
        question_order.shuffle(&mut question_rng);
    }

    question_order
        .into_iter()
        .map(|question| PresentedSlot {
            question,
            options: std::mem::take(&mut option_orders[question]),
        })
        .collect()
}
