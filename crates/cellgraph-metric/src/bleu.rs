//! Sentence-level BLEU against multiple references.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Unigram-only weights.
pub const BLEU_1_WEIGHTS: [f64; 2] = [1.0, 0.0];
/// Evenly weighted unigram + bigram.
pub const BLEU_2_WEIGHTS: [f64; 2] = [0.5, 0.5];

/// `k` of smoothing method 4.
const SMOOTHING_K: f64 = 5.0;

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    // Words keep inner hyphens, slashes and apostrophes plus trailing `+`
    // ("t-cell", "cd4+"); any other punctuation is its own token.
    TOKEN.get_or_init(|| Regex::new(r"\w+(?:[-'/+]\w+)*\+*|[^\w\s]").expect("static regex"))
}

/// Split text into word and punctuation tokens.
pub fn word_tokenize(text: &str) -> Vec<String> {
    token_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Precision {
    numerator: usize,
    denominator: usize,
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= n {
        for gram in tokens.windows(n) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

/// Clipped n-gram precision; the denominator is never below 1.
fn modified_precision(references: &[Vec<String>], hypothesis: &[String], n: usize) -> Precision {
    let counts = ngram_counts(hypothesis, n);

    let mut max_counts: HashMap<&[String], usize> = HashMap::new();
    for reference in references {
        let reference_counts = ngram_counts(reference, n);
        for gram in counts.keys() {
            let seen = reference_counts.get(gram).copied().unwrap_or(0);
            let best = max_counts.entry(*gram).or_insert(0);
            *best = (*best).max(seen);
        }
    }

    let numerator = counts
        .iter()
        .map(|(gram, count)| (*count).min(max_counts.get(gram).copied().unwrap_or(0)))
        .sum();
    let denominator = counts.values().sum::<usize>().max(1);

    Precision {
        numerator,
        denominator,
    }
}

/// Reference length closest to the hypothesis length; ties go to the shorter.
fn closest_ref_length(references: &[Vec<String>], hyp_len: usize) -> usize {
    references
        .iter()
        .map(Vec::len)
        .min_by_key(|len| (len.abs_diff(hyp_len), *len))
        .unwrap_or(0)
}

fn brevity_penalty(closest_ref_len: usize, hyp_len: usize) -> f64 {
    if hyp_len > closest_ref_len {
        1.0
    } else if hyp_len == 0 {
        0.0
    } else {
        (1.0 - closest_ref_len as f64 / hyp_len as f64).exp()
    }
}

/// Smoothing method 4: zero-count precisions get `1 / (2^i * k / ln(len))`.
fn smooth(precisions: &[Precision], hyp_len: usize) -> Vec<f64> {
    let mut incvnt = 1;
    precisions
        .iter()
        .map(|p| {
            if p.numerator == 0 && hyp_len > 1 {
                let numerator = 1.0 / (2f64.powi(incvnt) * SMOOTHING_K / (hyp_len as f64).ln());
                incvnt += 1;
                numerator / p.denominator as f64
            } else {
                p.numerator as f64 / p.denominator as f64
            }
        })
        .collect()
}

/// BLEU of one tokenized hypothesis against tokenized references, in `0..=1`.
///
/// `weights[i]` weighs the (i+1)-gram precision. A hypothesis sharing no
/// unigram with any reference scores 0.
pub fn sentence_bleu(references: &[Vec<String>], hypothesis: &[String], weights: &[f64]) -> f64 {
    let precisions: Vec<Precision> = (1..=weights.len())
        .map(|n| modified_precision(references, hypothesis, n))
        .collect();

    if precisions.first().map_or(true, |p| p.numerator == 0) {
        return 0.0;
    }

    let hyp_len = hypothesis.len();
    let bp = brevity_penalty(closest_ref_length(references, hyp_len), hyp_len);

    let log_sum: f64 = weights
        .iter()
        .zip(smooth(&precisions, hyp_len))
        .filter(|(_, p)| *p > 0.0)
        .map(|(w, p)| w * p.ln())
        .sum();

    bp * log_sum.exp()
}
