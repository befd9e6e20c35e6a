use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding backend.
    #[error("Failed to initialize embedder: {0}")]
    Initialization(String),

    /// Failed to generate embeddings.
    #[error("Failed to generate embeddings: {0}")]
    Generation(String),

    /// Invalid input provided to the embedder.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Produced or received a vector of the wrong dimensionality.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
