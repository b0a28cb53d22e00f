//! Documented constants for the memory store
//!
//! All tunable parameters in one place with justification for their values.
//! Centralizing constants prevents magic numbers and makes tuning easier.

// =============================================================================
// CHUNK REPOSITORY
// =============================================================================

/// Subdirectory of the data directory that holds chunk files
pub const CHUNKS_DIR: &str = "chunks";

/// File extension for chunk files
pub const CHUNK_EXTENSION: &str = "md";

/// Length of a chunk identifier in hex characters (3 random bytes)
///
/// 16^6 = ~16.7M possible IDs. At the target scale of 10^4 chunks the
/// collision probability per draw stays below 0.1%, and the retry loop
/// absorbs the rest.
pub const CHUNK_ID_LEN: usize = 6;

/// Attempts at drawing a fresh chunk ID before giving up
///
/// 100 consecutive collisions at <0.1% collision probability each means the
/// store is effectively full; failing hard beats spinning.
pub const ID_GENERATION_MAX_ATTEMPTS: u32 = 100;

/// Maximum length of the filename slug derived from a chunk summary
///
/// Long enough to scan a directory listing, short enough to keep paths
/// comfortably under platform limits with the ID prefix attached.
pub const SLUG_MAX_LEN: usize = 15;

// =============================================================================
// SEMANTIC INDEX
// =============================================================================

/// Default embedding model name
pub const DEFAULT_MODEL_NAME: &str = "bge-small-en-v1.5";

/// Embedding dimension of the default model
pub const DEFAULT_DIMENSION: usize = 384;

/// Default index capacity (slots)
///
/// Matches the stated scale ceiling of tens of thousands of chunks.
pub const DEFAULT_MAX_ELEMENTS: usize = 10_000;

/// HNSW: max outgoing links per node on upper layers (M)
pub const DEFAULT_M: usize = 16;

/// HNSW: candidate list size during construction
pub const DEFAULT_EF_CONSTRUCTION: usize = 100;

/// HNSW: candidate list size during search
pub const DEFAULT_EF: usize = 50;

/// Maximum tokens fed to the embedding model per text
pub const EMBED_MAX_LENGTH: usize = 256;

// =============================================================================
// FILE WATCHER
// =============================================================================

/// A changed file must hold its size this long before an event is emitted
pub const WRITE_SETTLE_MS: u64 = 500;

/// How often pending paths are re-checked for settling
pub const WATCH_POLL_MS: u64 = 100;

// =============================================================================
// AUDIT LOG
// =============================================================================

/// Audit log filename inside the data directory
pub const AUDIT_LOG_FILE: &str = "audit.log";

/// Content excerpt length recorded on UPDATE audit entries
pub const AUDIT_EXCERPT_LEN: usize = 100;

// =============================================================================
// ORCHESTRATOR
// =============================================================================

/// Default result count for semantic queries
pub const DEFAULT_QUERY_LIMIT: usize = 10;
