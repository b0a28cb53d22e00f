//! Deterministic hash-based embeddings
//!
//! Feature-hashes words and character trigrams into a fixed-dimension vector.
//! Far weaker than a sentence transformer, but deterministic, dependency-free
//! and fast, which makes it the embedder of choice for tests and the fallback
//! when model files are absent. Token overlap between texts translates into
//! cosine similarity, so relative ordering of obviously-related texts holds.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use anyhow::Result;

use super::{normalize, Embedder};
use crate::constants::DEFAULT_DIMENSION;

/// Weight of a whole-word feature
const WORD_WEIGHT: f32 = 1.0;

/// Weight of a character-trigram feature; trigrams let inflected forms of
/// the same stem ("evaluate"/"evaluating") overlap
const TRIGRAM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn bump(&self, embedding: &mut [f32], token: &str, weight: f32) {
        // DefaultHasher::new() uses fixed keys, so features are stable
        // across runs and processes
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let h = hasher.finish();

        let primary = (h % self.dimension as u64) as usize;
        let secondary = ((h >> 32) % self.dimension as u64) as usize;
        embedding[primary] += weight;
        embedding[secondary] += weight * 0.5;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl Embedder for HashEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0; self.dimension];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.bump(&mut embedding, word, WORD_WEIGHT);

            let chars: Vec<char> = word.chars().collect();
            for trigram in chars.windows(3) {
                let trigram: String = trigram.iter().collect();
                self.bump(&mut embedding, &trigram, TRIGRAM_WEIGHT);
            }
        }

        // Empty text stays the zero vector
        normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
