//! Vector math over fixed-dimension embeddings.
//!
//! Every vector that reaches [`cosine_similarity`] is expected to be unit
//! length already, so similarity is a plain dot product.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Scale an embedding to unit length.
///
/// Fails with [`EmbeddingError::DegenerateVector`] when the Euclidean norm is
/// zero or not finite.
pub fn normalize(mut embedding: Embedding) -> Result<Embedding> {
    let norm = l2_norm(&embedding);
    if norm == 0.0 || !norm.is_finite() {
        return Err(EmbeddingError::DegenerateVector { norm });
    }
    for x in embedding.iter_mut() {
        *x /= norm;
    }
    Ok(embedding)
}

/// Euclidean norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity of two pre-normalized embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal vectors
/// - -1.0 means opposite vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// A scored candidate, identified by its position in the candidate sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// Position of the candidate in the sequence that was scored.
    pub position: usize,

    /// Similarity score.
    pub score: f32,
}

/// Find the top-k most similar candidates.
///
/// Results are ordered by descending score; equal scores keep the order in
/// which the candidates were supplied.
pub fn find_top_k<'a, I>(query: &[f32], candidates: I, k: usize) -> Result<Vec<SimilarityResult>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut scores: Vec<(OrderedFloat<f32>, usize)> = Vec::new();

    for (position, embedding) in candidates.into_iter().enumerate() {
        let score = cosine_similarity(query, embedding)?;
        scores.push((OrderedFloat(score), position));
    }

    // Stable sort keeps supplied order among ties
    scores.sort_by_key(|&(score, _)| Reverse(score));

    Ok(scores
        .into_iter()
        .take(k)
        .map(|(score, position)| SimilarityResult {
            position,
            score: score.0,
        })
        .collect())
}
