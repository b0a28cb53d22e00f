//! Structured error types for the memory store
//!
//! Every failure the store can surface to a caller is a variant here, with a
//! stable machine-readable code for the RPC layer to map onto its own error
//! vocabulary.

use std::fmt;

/// Errors surfaced by the memory store and its components
#[derive(Debug)]
pub enum MemoryError {
    /// A required metadata field was absent when storing a chunk
    MissingRequiredField(String),

    /// The requested chunk ID does not resolve to a stored chunk
    ChunkNotFound(String),

    /// A chunk file could not be parsed
    InvalidFormat { file: String, reason: String },

    /// The semantic index has no free slots left
    CapacityExceeded { capacity: usize },

    /// ID generation collided with existing chunks too many times
    IdExhausted { attempts: u32 },

    /// Disk failure reading or writing the chunk repository
    Io(std::io::Error),

    /// The embedder could not produce a vector
    EmbedderUnavailable(String),

    /// The process-wide store was already initialized with another directory
    AlreadyInitialized { current: std::path::PathBuf },
}

impl MemoryError {
    /// Stable code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingRequiredField(_) => "MISSING_REQUIRED_FIELD",
            Self::ChunkNotFound(_) => "CHUNK_NOT_FOUND",
            Self::InvalidFormat { .. } => "INVALID_FORMAT",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::IdExhausted { .. } => "ID_EXHAUSTED",
            Self::Io(_) => "IO_ERROR",
            Self::EmbedderUnavailable(_) => "EMBEDDER_UNAVAILABLE",
            Self::AlreadyInitialized { .. } => "ALREADY_INITIALIZED",
        }
    }

    /// Detailed human-readable message
    pub fn message(&self) -> String {
        match self {
            Self::MissingRequiredField(field) => {
                format!("Missing required metadata field: {field}")
            }
            Self::ChunkNotFound(id) => format!("Chunk not found: {id}"),
            Self::InvalidFormat { file, reason } => {
                format!("Invalid chunk format in {file}: {reason}")
            }
            Self::CapacityExceeded { capacity } => {
                format!("Semantic index is full ({capacity} slots)")
            }
            Self::IdExhausted { attempts } => {
                format!("Could not generate a unique chunk ID after {attempts} attempts")
            }
            Self::Io(err) => format!("I/O error: {err}"),
            Self::EmbedderUnavailable(msg) => format!("Embedder unavailable: {msg}"),
            Self::AlreadyInitialized { current } => format!(
                "Memory store already initialized with data directory {}",
                current.display()
            ),
        }
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for MemoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MemoryError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Type alias for Results using MemoryError
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            MemoryError::MissingRequiredField("summary".into()).code(),
            "MISSING_REQUIRED_FIELD"
        );
        assert_eq!(
            MemoryError::ChunkNotFound("abc123".into()).code(),
            "CHUNK_NOT_FOUND"
        );
        assert_eq!(
            MemoryError::CapacityExceeded { capacity: 10 }.code(),
            "CAPACITY_EXCEEDED"
        );
    }

    #[test]
    fn test_messages_carry_context() {
        let err = MemoryError::ChunkNotFound("deadbe".into());
        assert!(err.message().contains("deadbe"));

        let err = MemoryError::IdExhausted { attempts: 100 };
        assert!(err.message().contains("100"));
    }

    #[test]
    fn test_io_source_preserved() {
        use std::error::Error;
        let err = MemoryError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(err.source().is_some());
        assert_eq!(err.code(), "IO_ERROR");
    }
}
