//! Cellgraph metric: comparing predicted cell-type labels with curated ones.
//!
//! Predictions and references are free text, so both sides go through the
//! same normalization before they are compared:
//!
//! ```text
//!   "T cells, likely activated"  ──normalize──►  "t cell"
//!   ["T cell", "T-cell"]         ──normalize──►  ["t cell", "t-cell"]
//!                                                      │
//!                                        sentence BLEU (smoothed, multi-ref)
//!                                                      │
//!                                     BLEU-1 / BLEU-2 / BLEU-avg (0..=100)
//! ```
//!
//! Scores follow the sentence-level BLEU definition with modified n-gram
//! precision clipped against every reference, the closest-reference brevity
//! penalty, and the "method 4" smoothing of Chen & Cherry (2014) so a missing
//! bigram match does not collapse the geometric mean to zero.

pub mod bleu;
pub mod normalize;

pub use bleu::{sentence_bleu, word_tokenize, BLEU_1_WEIGHTS, BLEU_2_WEIGHTS};
pub use normalize::{normalize, normalize_opt, singular_noun};

/// Errors raised when a prediction or its references cannot be scored.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    #[error("no reference strings were supplied")]
    NoReferences,
    #[error("prediction {0:?} has no tokens after normalization")]
    UntokenizablePrediction(String),
    #[error("none of the {0} reference strings has tokens after normalization")]
    UntokenizableReferences(usize),
}

/// BLEU scores for one prediction, as percentages rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BleuScores {
    pub bleu_1: f64,
    pub bleu_2: f64,
    pub bleu_avg: f64,
}

impl BleuScores {
    pub const ZERO: BleuScores = BleuScores {
        bleu_1: 0.0,
        bleu_2: 0.0,
        bleu_avg: 0.0,
    };
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Score `prediction` against a set of reference synonyms.
///
/// Both sides are normalized first. BLEU-1 uses weights `(1, 0)`, BLEU-2
/// weights `(0.5, 0.5)`; `bleu_avg` is their mean. All three are scaled to
/// `0..=100` and rounded to two decimals.
pub fn evaluate_bleu_score<S: AsRef<str>>(
    references: &[S],
    prediction: &str,
) -> Result<BleuScores, MetricError> {
    if references.is_empty() {
        return Err(MetricError::NoReferences);
    }

    let normalized = normalize(prediction);
    let hypothesis = word_tokenize(&normalized);
    if hypothesis.is_empty() {
        return Err(MetricError::UntokenizablePrediction(prediction.to_string()));
    }

    let refs: Vec<Vec<String>> = references
        .iter()
        .map(|r| word_tokenize(&normalize(r.as_ref())))
        .collect();
    if refs.iter().all(|r| r.is_empty()) {
        return Err(MetricError::UntokenizableReferences(refs.len()));
    }

    let bleu_1 = sentence_bleu(&refs, &hypothesis, &BLEU_1_WEIGHTS);
    let bleu_2 = sentence_bleu(&refs, &hypothesis, &BLEU_2_WEIGHTS);
    let bleu_avg = (bleu_1 + bleu_2) / 2.0;

    Ok(BleuScores {
        bleu_1: round2(bleu_1 * 100.0),
        bleu_2: round2(bleu_2 * 100.0),
        bleu_avg: round2(bleu_avg * 100.0),
    })
}
