use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Query is empty or whitespace-only. Surfaced to the caller as a
    /// validation failure, never silently treated as no-retrieval.
    #[error("Query is empty")]
    EmptyQuery,

    /// Structural index failure (not loaded, dimension-incompatible).
    #[error("Index error: {0}")]
    Index(#[from] sift_index::IndexError),

    /// Configuration rejected at engine construction.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker-pool task failed to complete.
    #[error("Internal task failure: {0}")]
    Internal(String),
}

/// Reranker-local failure. Recovered inside the engine by falling back to
/// fused ordering; it never surfaces to the caller.
#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Scoring backend unavailable: {0}")]
    ScorerUnavailable(String),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
