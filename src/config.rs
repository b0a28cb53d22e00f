//! Configuration for the memory store
//!
//! Sensible defaults, overridable from the environment. The data directory
//! is fixed at first initialization; everything else is tunable per process.

use std::env;
use std::path::PathBuf;

use tracing::info;

use crate::constants::{
    DEFAULT_DIMENSION, DEFAULT_EF, DEFAULT_EF_CONSTRUCTION, DEFAULT_M, DEFAULT_MAX_ELEMENTS,
    DEFAULT_MODEL_NAME,
};
use crate::index::HnswConfig;

/// Semantic index options
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Embedding model name
    pub model_name: String,

    /// Explicit model directory; when unset, default locations are searched
    pub model_dir: Option<PathBuf>,

    /// Embedding dimension
    pub dimension: usize,

    /// Index slot capacity
    pub max_elements: usize,

    /// HNSW M parameter
    pub m: usize,

    /// HNSW construction candidate list size
    pub ef_construction: usize,

    /// HNSW search candidate list size
    pub ef: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            model_dir: None,
            dimension: DEFAULT_DIMENSION,
            max_elements: DEFAULT_MAX_ELEMENTS,
            m: DEFAULT_M,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef: DEFAULT_EF,
        }
    }
}

impl IndexConfig {
    pub fn to_hnsw(&self) -> HnswConfig {
        HnswConfig {
            dimension: self.dimension,
            max_elements: self.max_elements,
            m: self.m,
            ef_construction: self.ef_construction,
            ef: self.ef,
        }
    }

    /// The directory the embedding model is loaded from
    ///
    /// The explicit `model_dir` wins when set. Otherwise the default
    /// locations are searched for `model.onnx` under the configured model
    /// name, falling back to the local models directory:
    /// 1. ./models/<model_name>
    /// 2. <user data dir>/kura-memory/models/<model_name>
    pub fn resolved_model_dir(&self) -> PathBuf {
        if let Some(dir) = &self.model_dir {
            return dir.clone();
        }
        let candidates = [
            Some(PathBuf::from("./models").join(&self.model_name)),
            dirs::data_dir().map(|p| p.join("kura-memory/models").join(&self.model_name)),
        ];
        candidates
            .into_iter()
            .flatten()
            .find(|p| p.join("model.onnx").exists())
            .unwrap_or_else(|| PathBuf::from("./models").join(&self.model_name))
    }
}

/// Store configuration loaded from the environment with defaults
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base directory holding `chunks/` and `audit.log`
    pub data_dir: PathBuf,

    /// Semantic index options
    pub index: IndexConfig,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            index: IndexConfig::default(),
        }
    }

    /// Load configuration from environment variables, starting from
    /// `data_dir` (KURA_DATA_DIR overrides it when set)
    pub fn from_env(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(data_dir);

        if let Ok(val) = env::var("KURA_DATA_DIR") {
            if !val.is_empty() {
                config.data_dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("KURA_MODEL_NAME") {
            if !val.is_empty() {
                config.index.model_name = val;
            }
        }

        if let Ok(val) = env::var("KURA_MODEL_PATH") {
            if !val.is_empty() {
                config.index.model_dir = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = env::var("KURA_INDEX_CAPACITY") {
            if let Ok(n) = val.parse() {
                config.index.max_elements = n;
            }
        }

        if let Ok(val) = env::var("KURA_INDEX_M") {
            if let Ok(n) = val.parse() {
                config.index.m = n;
            }
        }

        if let Ok(val) = env::var("KURA_INDEX_EF_CONSTRUCTION") {
            if let Ok(n) = val.parse() {
                config.index.ef_construction = n;
            }
        }

        if let Ok(val) = env::var("KURA_INDEX_EF") {
            if let Ok(n) = val.parse() {
                config.index.ef = n;
            }
        }

        config
    }

    /// Log the effective configuration
    pub fn log(&self) {
        info!("Configuration:");
        info!("   Data dir: {:?}", self.data_dir);
        info!(
            "   Model: {} ({}d) from {:?}",
            self.index.model_name,
            self.index.dimension,
            self.index.resolved_model_dir()
        );
        info!(
            "   Index: capacity={} M={} efConstruction={} ef={}",
            self.index.max_elements, self.index.m, self.index.ef_construction, self.index.ef
        );
    }
}
