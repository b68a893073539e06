//! Semantic dedup against sibling embeddings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DedupError {
    #[error("embedding dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Cosine similarity in [-1, 1]. A zero-norm vector has similarity 0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64, DedupError> {
    if a.len() != b.len() {
        return Err(DedupError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    /// Index of the first sibling at or above the threshold.
    pub sibling_index: usize,
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DedupReport {
    pub duplicate: Option<DuplicateMatch>,
    /// Highest similarity seen before stopping (0 with no siblings).
    pub max_similarity: f64,
    pub compared: usize,
}

/// Whether a similarity counts as a duplicate. The threshold is inclusive.
pub fn is_duplicate(similarity: f64, threshold: f64) -> bool {
    similarity >= threshold
}

/// Compare `candidate` against `siblings` in order, stopping at the first
/// similarity `>= threshold`.
pub fn find_duplicate(
    candidate: &[f64],
    siblings: &[Vec<f64>],
    threshold: f64,
) -> Result<DedupReport, DedupError> {
    let mut max_similarity: f64 = 0.0;
    let mut compared = 0;

    for (idx, sibling) in siblings.iter().enumerate() {
        let similarity = cosine_similarity(candidate, sibling)?;
        compared += 1;
        max_similarity = max_similarity.max(similarity);
        if is_duplicate(similarity, threshold) {
            return Ok(DedupReport {
                duplicate: Some(DuplicateMatch {
                    sibling_index: idx,
                    similarity,
                }),
                max_similarity,
                compared,
            });
        }
    }

    Ok(DedupReport {
        duplicate: None,
        max_similarity,
        compared,
    })
}
