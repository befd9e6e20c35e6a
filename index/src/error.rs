use sift_chunk::ChunkId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    /// Embedding dimensionality disagreement while building or querying.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A chunk reached the vector index without a precomputed embedding.
    #[error("Chunk '{id}' has no embedding")]
    MissingEmbedding { id: ChunkId },

    /// Persisted index file does not exist.
    #[error("Index file not found: {}", path.display())]
    Missing { path: PathBuf },

    /// Persisted index file exists but cannot be decoded.
    #[error("Index file is corrupt: {0}")]
    Corrupt(String),

    /// Persisted index file uses a format this build cannot read.
    #[error("Unsupported index format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// Persisted index header and payload disagree on dimensionality.
    #[error("Index header declares dimension {header} but entry '{id}' has {actual}")]
    DimensionIncompatible {
        header: usize,
        id: ChunkId,
        actual: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexError {
    /// Whether this error came from loading a persisted index (as opposed to
    /// building or querying one). Load errors are fatal at startup; a process
    /// must not serve queries over a half-loaded index.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            IndexError::Missing { .. }
                | IndexError::Corrupt(_)
                | IndexError::UnsupportedVersion { .. }
                | IndexError::DimensionIncompatible { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
