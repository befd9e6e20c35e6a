use crate::error::EmbeddingError;
use crate::{DEFAULT_EMBEDDING_DIM, Embedder};
use log::debug;
use sha1::{Digest, Sha1};
use sift_tokenizer::Tokenizer;

/// Deterministic feature-hashing embedder.
///
/// Each token is hashed into one of `dimension` buckets with a hash-derived
/// sign, and the resulting bag-of-tokens vector is L2-normalized. The same
/// text always maps to the same vector, across processes and instances,
/// which is what index round-tripping requires.
pub struct HashingEmbedder {
    dimension: usize,
    tokenizer: Tokenizer,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            tokenizer: Tokenizer::default(),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in self.tokenizer.tokenize(text) {
            let digest = Sha1::digest(token.as_bytes());
            let hash = u64::from_be_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]);
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        vector
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.dimension == 0 {
            return Err(EmbeddingError::Initialization(
                "embedding dimension must be > 0".to_string(),
            ));
        }

        debug!("Hashing {} texts into {} dims", texts.len(), self.dimension);
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
