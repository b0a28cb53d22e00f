//! Kura-Memory Library
//!
//! Long-lived, single-user semantic memory store for a conversational agent.
//! Knowledge lives as small self-contained "chunks" in a human-editable
//! directory of markdown files; retrieval runs over an in-memory HNSW index
//! of sentence embeddings that is kept in sync with the files.
//!
//! # Key Features
//! - Stable 6-hex chunk IDs with front-matter + body files anyone can edit
//! - Local embeddings (bge-small-en-v1.5 via ONNX) with a deterministic
//!   hash fallback
//! - Approximate nearest-neighbor retrieval with slot reuse on churn
//! - Append-only audit log of every operation
//! - Directory watcher that reconciles external edits back into the index
//!
//! The [`store::MemoryStore`] orchestrator is the sole mutation entry point;
//! an RPC layer maps tool calls onto its operations one-to-one.

pub mod audit;
pub mod chunk;
pub mod config;
pub mod constants;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod store;
pub mod tracing_setup;
pub mod watcher;

pub use chunk::{Chunk, ChunkMeta, ChunkPatch, ChunkType, EpistemicStatus, LifecycleStatus};
pub use config::StoreConfig;
pub use errors::{MemoryError, Result};
pub use store::{memory_store, shutdown_memory_store, MemoryStore, StoreStats};

// Re-export dependencies so tests and embedders use the same version
pub use chrono;
pub use parking_lot;
