use crate::FORMAT_VERSION;
use crate::error::{IndexError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sift_chunk::{Chunk, ChunkId};
use std::collections::HashMap;
use std::path::Path;

/// One indexed chunk together with its L2-normalized embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Persisted form of a [`VectorIndex`].
#[derive(Debug, Serialize, Deserialize)]
struct VectorIndexFile {
    format_version: u32,
    dimension: usize,
    entries: Vec<VectorEntry>,
}

/// Exact nearest-neighbor index over dense chunk embeddings.
///
/// Vectors are L2-normalized at build time, so cosine similarity reduces to
/// a dot product at query time. The index owns its chunks and is the sole
/// resolver from [`ChunkId`] back to content.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<VectorEntry>,
    by_id: HashMap<ChunkId, usize>,
}

impl VectorIndex {
    /// Build an index from chunks carrying precomputed embeddings.
    ///
    /// The first chunk fixes the dimensionality; any chunk that disagrees
    /// fails the whole build with [`IndexError::DimensionMismatch`].
    pub fn build(chunks: Vec<Chunk>) -> Result<Self> {
        let mut dimension = 0;
        let mut entries = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let embedding = chunk.embedding.as_deref().ok_or_else(|| {
                IndexError::MissingEmbedding {
                    id: chunk.id.clone(),
                }
            })?;

            if dimension == 0 {
                dimension = embedding.len();
            } else if embedding.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: embedding.len(),
                });
            }

            let vector = normalize(embedding);
            entries.push(VectorEntry { chunk, vector });
        }

        info!(
            "Built vector index: {} chunks, dimension {dimension}",
            entries.len()
        );
        Ok(Self::from_entries(dimension, entries))
    }

    fn from_entries(dimension: usize, entries: Vec<VectorEntry>) -> Self {
        let by_id = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.chunk.id.clone(), idx))
            .collect();
        Self {
            dimension,
            entries,
            by_id,
        }
    }

    /// Top-`k` chunks by cosine similarity to `query`, best-first.
    ///
    /// `k` larger than the corpus returns every chunk. Ties are broken by
    /// chunk id so results are deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(ChunkId, f32)>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let query = normalize(query);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (idx, dot(&query, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.entries[a.0].chunk.id.cmp(&self.entries[b.0].chunk.id))
        });
        scored.truncate(k);

        debug!("Vector search returned {} results", scored.len());
        Ok(scored
            .into_iter()
            .map(|(idx, score)| (self.entries[idx].chunk.id.clone(), score))
            .collect())
    }

    /// Resolve a chunk id back to its content.
    pub fn chunk(&self, id: &ChunkId) -> Option<&Chunk> {
        self.by_id.get(id).map(|idx| &self.entries[*idx].chunk)
    }

    /// Iterate over all indexed chunks.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist the index to `path` as a versioned JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = VectorIndexFile {
            format_version: FORMAT_VERSION,
            dimension: self.dimension,
            entries: self.entries.clone(),
        };
        let payload = serde_json::to_vec(&file)?;
        std::fs::write(path, payload)?;
        info!("Saved vector index ({} chunks) to {}", self.len(), path.display());
        Ok(())
    }

    /// Load a previously saved index.
    ///
    /// A missing, undecodable, version-incompatible, or dimensionally
    /// inconsistent file fails loudly; loading never silently degrades.
    pub fn load(path: &Path) -> Result<Self> {
        let payload = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IndexError::Missing {
                    path: path.to_path_buf(),
                }
            } else {
                IndexError::Io(e)
            }
        })?;

        let file: VectorIndexFile =
            serde_json::from_slice(&payload).map_err(|e| IndexError::Corrupt(e.to_string()))?;

        if file.format_version != FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion {
                found: file.format_version,
                expected: FORMAT_VERSION,
            });
        }
        for entry in &file.entries {
            if entry.vector.len() != file.dimension {
                return Err(IndexError::DimensionIncompatible {
                    header: file.dimension,
                    id: entry.chunk.id.clone(),
                    actual: entry.vector.len(),
                });
            }
        }

        info!(
            "Loaded vector index ({} chunks) from {}",
            file.entries.len(),
            path.display()
        );
        Ok(Self::from_entries(file.dimension, file.entries))
    }
}

fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter().map(|v| v / norm).collect()
    } else {
        vector.to_vec()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn chunk(id: &str, embedding: Vec<f32>) -> Chunk {
        Chunk::new(id, format!("{id}.md"), format!("content of {id}")).with_embedding(embedding)
    }

    fn build_index() -> VectorIndex {
        VectorIndex::build(vec![
            chunk("a", vec![1.0, 0.0, 0.0]),
            chunk("b", vec![0.0, 1.0, 0.0]),
            chunk("c", vec![0.7, 0.7, 0.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = build_index();
        let results = index.search(&[1.0, 0.0, 0.0], 3).unwrap();

        assert_eq!(results[0].0.as_str(), "a");
        assert_eq!(results[1].0.as_str(), "c");
        assert_eq!(results[2].0.as_str(), "b");
        assert!((results[0].1 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_k_larger_than_corpus_returns_everything() {
        let index = build_index();
        let results = index.search(&[1.0, 0.0, 0.0], 100).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_build_rejects_dimension_mismatch() {
        let err = VectorIndex::build(vec![
            chunk("a", vec![1.0, 0.0]),
            chunk("b", vec![1.0, 0.0, 0.0]),
        ])
        .unwrap_err();

        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_build_rejects_missing_embedding() {
        let err = VectorIndex::build(vec![Chunk::new("a", "a.md", "text")]).unwrap_err();
        assert!(matches!(err, IndexError::MissingEmbedding { .. }));
    }

    #[test]
    fn test_search_rejects_wrong_query_dimension() {
        let index = build_index();
        let err = index.search(&[1.0, 0.0], 3).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_empty_index_searches_empty() {
        let index = VectorIndex::build(Vec::new()).unwrap();
        assert_eq!(index.search(&[1.0, 0.0], 5).unwrap(), Vec::new());
    }

    #[test]
    fn test_chunk_lookup() {
        let index = build_index();
        assert!(index.chunk(&ChunkId::new("b")).is_some());
        assert!(index.chunk(&ChunkId::new("zz")).is_none());
    }

    #[test]
    fn test_save_load_roundtrip_preserves_search() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vectors.json");

        let index = build_index();
        index.save(&path).unwrap();
        let loaded = VectorIndex::load(&path).unwrap();

        let query = [0.9, 0.1, 0.0];
        assert_eq!(
            index.search(&query, 3).unwrap(),
            loaded.search(&query, 3).unwrap()
        );
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = VectorIndex::load(&temp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, IndexError::Missing { .. }));
        assert!(err.is_load_error());
    }

    #[test]
    fn test_load_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vectors.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = VectorIndex::load(&path).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)));
        assert!(err.is_load_error());
    }

    #[test]
    fn test_load_rejects_unsupported_version() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vectors.json");
        std::fs::write(
            &path,
            br#"{"format_version":99,"dimension":2,"entries":[]}"#,
        )
        .unwrap();

        let err = VectorIndex::load(&path).unwrap_err();
        assert!(matches!(err, IndexError::UnsupportedVersion { found: 99, .. }));
    }

    #[test]
    fn test_load_rejects_incompatible_entry_dimension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vectors.json");
        std::fs::write(
            &path,
            br#"{"format_version":1,"dimension":3,"entries":[{"chunk":{"id":"a","source_path":"a.md","content":"x"},"vector":[1.0,0.0]}]}"#,
        )
        .unwrap();

        let err = VectorIndex::load(&path).unwrap_err();
        assert!(matches!(err, IndexError::DimensionIncompatible { .. }));
    }
}
