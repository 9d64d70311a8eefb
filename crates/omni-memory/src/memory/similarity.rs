//! Cosine similarity and in-process ranking
//!
//! Cosine similarity is the only relevance metric in the system. The
//! store-ranked path computes the same quantity as `1 - cosine distance`
//! inside Postgres, and LanceDB rescores its candidates here; the functions
//! here also serve the scan-ranked path and anything else that compares
//! vectors.

use crate::error::{MemoryError, Result};
use crate::memory::types::{MemoryRecord, ScoredMemory};

/// Decimal places similarity scores are rounded to at the tool boundary
pub const SIMILARITY_DECIMAL_PLACES: u8 = 3;

/// Cosine similarity of two vectors, clamped to [-1, 1].
///
/// Returns `0.0` when either vector has zero norm. Vectors of different
/// length cannot be compared and produce a validation error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(MemoryError::Validation(format!(
            "embedding dimension mismatch: query has {} dimensions, candidate has {}",
            a.len(),
            b.len()
        )));
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Score candidates against `query`, drop those below `min_similarity`,
/// and keep the best `limit`.
///
/// Candidates are expected newest first; the sort is stable so equal
/// scores keep that order. A single mismatched candidate fails the whole
/// ranking.
pub fn rank(
    query: &[f32],
    candidates: Vec<MemoryRecord>,
    min_similarity: f32,
    limit: usize,
) -> Result<Vec<ScoredMemory>> {
    let mut scored = Vec::with_capacity(candidates.len());
    for record in candidates {
        let similarity = cosine_similarity(query, &record.embedding).map_err(|e| {
            MemoryError::Validation(format!("record {}: {}", record.id, strip_prefix(&e)))
        })?;
        if similarity >= min_similarity {
            scored.push(ScoredMemory { record, similarity });
        }
    }

    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    scored.truncate(limit);
    Ok(scored)
}

/// Round a similarity score for presentation
pub fn round_similarity(score: f32) -> f64 {
    quantize_score(score as f64, SIMILARITY_DECIMAL_PLACES)
}

fn quantize_score(score: f64, decimal_places: u8) -> f64 {
    let multiplier = 10_f64.powi(decimal_places as i32);
    (score * multiplier).round() / multiplier
}

fn strip_prefix(err: &MemoryError) -> String {
    match err {
        MemoryError::Validation(msg) => msg.clone(),
        other => other.to_string(),
    }
}
