//! Shared data model for indexed content.
//!
//! A [`Chunk`] is the unit of indexed content: a text payload with its
//! originating document, position, optional content-type tag, and optional
//! precomputed embedding. Chunks are produced by the ingestion pipeline,
//! become immutable once an index is built over them, and are owned by the
//! index that holds them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Language tag marking chunks synthesized from an external search provider
/// rather than the local corpus.
pub const EXTERNAL_LANGUAGE: &str = "external";

/// Opaque chunk identifier, stable across rebuilds of a given document
/// version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChunkId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Where a chunk sits within its source document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPosition {
    /// Ordinal index of this chunk within its source (0-based).
    pub ordinal: usize,

    /// Byte offset where the chunk starts.
    pub start: usize,

    /// Byte offset just past the end of the chunk.
    pub end: usize,
}

impl ChunkPosition {
    pub fn new(ordinal: usize, start: usize, end: usize) -> Self {
        Self {
            ordinal,
            start,
            end,
        }
    }
}

/// Additional metadata attached to a chunk by the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ChunkMetadata {
    /// Version of the owning document when the chunk was produced.
    pub document_version: Option<String>,

    /// Custom metadata fields.
    #[serde(flatten)]
    pub custom: HashMap<String, serde_json::Value>,
}

/// A unit of indexed content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier, stable across rebuilds of a document version.
    pub id: ChunkId,

    /// Originating document or file identifier.
    pub source_path: String,

    /// Text payload.
    pub content: String,

    /// Position within the source document.
    #[serde(default)]
    pub position: ChunkPosition,

    /// Optional content-type tag ("code", "prose", ...), used to select
    /// tokenization rules.
    #[serde(default)]
    pub language: Option<String>,

    /// Dense embedding, precomputed by the ingestion pipeline. All chunks in
    /// one index share a dimensionality.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,

    /// Additional metadata.
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a new chunk without an embedding.
    pub fn new(
        id: impl Into<ChunkId>,
        source_path: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_path: source_path.into(),
            content: content.into(),
            position: ChunkPosition::default(),
            language: None,
            embedding: None,
            metadata: ChunkMetadata::default(),
        }
    }

    /// Attach a position.
    pub fn with_position(mut self, position: ChunkPosition) -> Self {
        self.position = position;
        self
    }

    /// Attach a content-type tag.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Attach a precomputed embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Estimated token count for budget packing, ~4 chars per token. Never
    /// zero for non-empty content.
    pub fn estimated_tokens(&self) -> usize {
        if self.content.is_empty() {
            0
        } else {
            self.content.len().div_ceil(4)
        }
    }

    /// Whether this chunk was synthesized from an external provider.
    pub fn is_external(&self) -> bool {
        self.language.as_deref() == Some(EXTERNAL_LANGUAGE)
    }
}
