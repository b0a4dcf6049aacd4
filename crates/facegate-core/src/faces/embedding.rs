use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// Fixed-length face feature vector produced by an external extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Wraps `values` after checking they can take part in a cosine comparison.
    pub fn new(values: Vec<f32>) -> AppResult<Self> {
        ensure_valid_embedding(&values)?;
        Ok(Self(values))
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    pub fn ensure_dimension(&self, expected: usize) -> AppResult<()> {
        if self.dimension() != expected {
            return Err(AppError::InvalidEmbedding {
                expected,
                found: self.dimension(),
            });
        }
        Ok(())
    }

    pub fn similarity(&self, other: &EmbeddingVector) -> f64 {
        cosine_similarity(&self.0, &other.0)
    }
}

impl TryFrom<Vec<f32>> for EmbeddingVector {
    type Error = AppError;

    fn try_from(values: Vec<f32>) -> AppResult<Self> {
        Self::new(values)
    }
}

pub fn ensure_valid_embedding(values: &[f32]) -> AppResult<()> {
    if values.is_empty() {
        return Err(AppError::MalformedEmbedding {
            message: "embedding vector is empty".into(),
        });
    }

    if let Some(idx) = values.iter().position(|value| !value.is_finite()) {
        return Err(AppError::MalformedEmbedding {
            message: format!("embedding value at index {idx} is not finite"),
        });
    }

    let magnitude = values
        .iter()
        .map(|&value| f64::from(value) * f64::from(value))
        .sum::<f64>()
        .sqrt();
    if magnitude <= f64::EPSILON {
        return Err(AppError::MalformedEmbedding {
            message: "embedding has zero magnitude".into(),
        });
    }

    Ok(())
}

/// Cosine similarity accumulated in `f64`, clamped to `[-1, 1]`.
///
/// Callers compare vectors of equal length only; the dimension check lives at
/// the database boundary.
pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_lhs = 0.0f64;
    let mut norm_rhs = 0.0f64;

    for (&l, &r) in lhs.iter().zip(rhs.iter()) {
        let (l, r) = (f64::from(l), f64::from(r));
        dot += l * r;
        norm_lhs += l * l;
        norm_rhs += r * r;
    }

    let denominator = (norm_lhs * norm_rhs).sqrt();
    if denominator <= 0.0 {
        return 0.0;
    }
    (dot / denominator).clamp(-1.0, 1.0)
}
