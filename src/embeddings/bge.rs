//! bge-small-en-v1.5 embedding model using ONNX Runtime
//!
//! Generates 384-dimensional sentence embeddings: mean pooling over the
//! token axis of the transformer output, then L2 normalization.
//!
//! The model is loaded lazily on the first encode call. When the model or
//! tokenizer files cannot be found the embedder degrades to deterministic
//! hash embeddings rather than failing startup; the embedding model is an
//! external capability, not part of the store.
//!
//! The model directory comes from the store configuration
//! ([`IndexConfig::resolved_model_dir`](crate::config::IndexConfig));
//! KURA_ONNX_THREADS tunes the ONNX intra-op thread count (default: 2).

use anyhow::Result;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokenizers::Tokenizer;

use super::hash::HashEmbedder;
use super::{normalize, Embedder};
use crate::constants::{DEFAULT_DIMENSION, DEFAULT_MODEL_NAME, EMBED_MAX_LENGTH};

/// Lazily initialized ONNX session and tokenizer
struct LazyModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl LazyModel {
    fn new(config: &EmbeddingConfig) -> Result<Self> {
        let num_threads = std::env::var("KURA_ONNX_THREADS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2);

        tracing::info!(
            "Loading {} from {:?} with {} threads",
            DEFAULT_MODEL_NAME,
            config.model_path,
            num_threads
        );

        let session = Session::builder()
            .map_err(|e| anyhow::anyhow!("Failed to create session builder: {e}"))?
            .with_intra_threads(num_threads)
            .map_err(|e| anyhow::anyhow!("Failed to set thread count: {e}"))?
            .commit_from_file(&config.model_path)
            .map_err(|e| anyhow::anyhow!("Failed to load ONNX model: {e}"))?;

        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {e}"))?;

        tracing::info!("{} loaded", DEFAULT_MODEL_NAME);

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }
}

/// Configuration for the BGE embedder
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Path to the ONNX model file
    pub model_path: PathBuf,

    /// Path to the tokenizer file
    pub tokenizer_path: PathBuf,

    /// Maximum sequence length
    pub max_length: usize,
}

impl EmbeddingConfig {
    /// Point at a model directory holding `model.onnx` + `tokenizer.json`
    ///
    /// Callers resolve the directory through the store configuration
    /// ([`IndexConfig::resolved_model_dir`](crate::config::IndexConfig)).
    pub fn for_model_dir(dir: &Path) -> Self {
        Self {
            model_path: dir.join("model.onnx"),
            tokenizer_path: dir.join("tokenizer.json"),
            max_length: EMBED_MAX_LENGTH,
        }
    }

    /// Explicit paths, for tests or programmatic use
    pub fn with_paths(model_path: PathBuf, tokenizer_path: PathBuf) -> Self {
        Self {
            model_path,
            tokenizer_path,
            max_length: EMBED_MAX_LENGTH,
        }
    }
}

/// bge-small-en-v1.5 embedder with ONNX Runtime
pub struct BgeEmbedder {
    config: EmbeddingConfig,
    /// Lazily initialized model (OnceLock for thread-safe init)
    lazy_model: OnceLock<std::result::Result<Arc<LazyModel>, String>>,
    /// Hash fallback used when model files are missing
    fallback: Option<HashEmbedder>,
    dimension: usize,
}

impl BgeEmbedder {
    /// Create a new embedder; degrades to hash mode when files are absent
    pub fn new(config: EmbeddingConfig) -> Self {
        let model_available =
            config.model_path.exists() && config.tokenizer_path.exists();

        if !model_available {
            tracing::warn!(
                model = %config.model_path.display(),
                "model files not found; using deterministic hash embeddings"
            );
            return Self {
                config,
                lazy_model: OnceLock::new(),
                fallback: Some(HashEmbedder::new(DEFAULT_DIMENSION)),
                dimension: DEFAULT_DIMENSION,
            };
        }

        tracing::info!("lazy loading enabled; model will load on first encode");
        Self {
            config,
            lazy_model: OnceLock::new(),
            fallback: None,
            dimension: DEFAULT_DIMENSION,
        }
    }

    /// Whether the embedder is running on the hash fallback
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Ensure the model is loaded (thread-safe, idempotent)
    fn ensure_model_loaded(&self) -> Result<&Arc<LazyModel>> {
        let result = self.lazy_model.get_or_init(|| {
            LazyModel::new(&self.config)
                .map(Arc::new)
                .map_err(|e| e.to_string())
        });

        match result {
            Ok(model) => Ok(model),
            Err(e) => Err(anyhow::anyhow!("Failed to load model: {e}")),
        }
    }

    fn encode_onnx(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.ensure_model_loaded()?;

        let mut session = model.session.lock();

        let encoding = model
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {e}"))?;

        let tokens = encoding.get_ids();
        let attention_mask = encoding.get_attention_mask();
        let max_length = self.config.max_length;

        // Truncate or pad to max_length
        let mut input_ids = vec![0i64; max_length];
        let mut attention = vec![0i64; max_length];
        let token_type_ids = vec![0i64; max_length];

        for (i, &token) in tokens.iter().take(max_length).enumerate() {
            input_ids[i] = token as i64;
        }
        for (i, &mask) in attention_mask.iter().take(max_length).enumerate() {
            attention[i] = mask as i64;
        }

        let input_ids_value = Value::from_array((vec![1, max_length], input_ids))?;
        let attention_mask_value = Value::from_array((vec![1, max_length], attention.clone()))?;
        let token_type_ids_value = Value::from_array((vec![1, max_length], token_type_ids))?;

        let outputs = session.run(ort::inputs![
            "input_ids" => &input_ids_value,
            "attention_mask" => &attention_mask_value,
            "token_type_ids" => &token_type_ids_value,
        ])?;

        // Output shape is [1, seq_length, hidden_size]
        let (_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;

        // Mean pooling over the sequence dimension, masked
        let mut pooled = vec![0.0; self.dimension];
        let mut mask_sum = 0.0;

        for (seq_idx, &att) in attention.iter().enumerate() {
            if att == 1 {
                for (dim_idx, pooled_val) in pooled.iter_mut().enumerate() {
                    let idx = seq_idx * self.dimension + dim_idx;
                    *pooled_val += output_data[idx];
                }
                mask_sum += 1.0;
            }
        }

        if mask_sum > 0.0 {
            for val in &mut pooled {
                *val /= mask_sum;
            }
        }

        normalize(&mut pooled);
        Ok(pooled)
    }
}

impl Embedder for BgeEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        match &self.fallback {
            Some(hash) => hash.encode(text),
            None => self.encode_onnx(text),
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
