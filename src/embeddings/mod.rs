//! Embedding generation
//!
//! The semantic index is generic over anything that can turn text into a
//! unit-normalized fixed-dimension vector. The production embedder runs
//! bge-small-en-v1.5 through ONNX Runtime; a deterministic hash embedder
//! covers tests and deployments without model files.

pub mod bge;
pub mod hash;

use anyhow::Result;

/// Trait for embedding generation
///
/// Implementations must be deterministic for a given text and return vectors
/// of unit L2 norm (or the zero vector for degenerate input).
pub trait Embedder: Send + Sync {
    /// Generate embedding for text
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;

    /// Batch encode multiple texts
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}

/// L2-normalize in place; returns false when the norm is zero or invalid
pub(crate) fn normalize(embedding: &mut [f32]) -> bool {
    for val in embedding.iter_mut() {
        if val.is_nan() || val.is_infinite() {
            *val = 0.0;
        }
    }

    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm.is_nan() || norm < f32::EPSILON {
        return false;
    }

    for val in embedding.iter_mut() {
        *val /= norm;
    }
    true
}
