//! Embedding boundary for the retrieval engine.
//!
//! Chunk embeddings are precomputed by the ingestion pipeline; at query time
//! the engine only needs to embed the query text through the same model. The
//! [`Embedder`] trait is that boundary: implementations are constructed once
//! per process and shared read-only across requests.
//!
//! [`HashingEmbedder`] is the built-in implementation: a deterministic
//! feature-hashing bag-of-tokens embedder that works offline and makes the
//! pipeline fully testable without a model runtime. Model-backed embedders
//! live behind the same trait in the ingestion service.

mod error;
mod hashing;

pub use error::EmbeddingError;
pub use hashing::HashingEmbedder;

/// Default embedding dimension for the hashing embedder.
pub const DEFAULT_EMBEDDING_DIM: usize = 256;

/// Generates dense embeddings for text.
pub trait Embedder: Send + Sync {
    /// Dimensionality of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(std::slice::from_ref(&text.to_string()))?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Generation("empty embedding batch".to_string()))
    }
}
