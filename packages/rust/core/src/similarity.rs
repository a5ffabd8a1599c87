//! Pluggable text similarity scoring.
//!
//! The scorer is chosen once, at construction time, from
//! [`SimilarityKind`]; call sites only ever see `Arc<dyn Similarity>`.

use std::sync::Arc;

use docoutline_shared::SimilarityKind;

/// A symmetric text similarity score in `[0, 1]`.
pub trait Similarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// `1 - levenshtein(a, b) / max(len_a, len_b)`, over chars.
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizedLevenshtein;

impl Similarity for NormalizedLevenshtein {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let longest = a.len().max(b.len());
        if longest == 0 {
            return 1.0;
        }
        1.0 - levenshtein(&a, &b) as f64 / longest as f64
    }
}

/// `2 * lcs(a, b) / (len_a + len_b)`, over chars. Always available.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequenceRatio;

impl Similarity for SequenceRatio {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let total = a.len() + b.len();
        if total == 0 {
            return 1.0;
        }
        2.0 * lcs_len(&a, &b) as f64 / total as f64
    }
}

/// Instantiate the scorer for `kind`.
pub fn build_similarity(kind: SimilarityKind) -> Arc<dyn Similarity> {
    match kind {
        SimilarityKind::Levenshtein => Arc::new(NormalizedLevenshtein),
        SimilarityKind::SequenceRatio => Arc::new(SequenceRatio),
    }
}

/// The default scorer.
pub fn default_similarity() -> Arc<dyn Similarity> {
    build_similarity(SimilarityKind::default())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
