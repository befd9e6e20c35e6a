use crate::evaluate::Verdict;
use serde::{Deserialize, Serialize};
use sift_chunk::Chunk;

/// A chunk annotated with the scores it accumulated on its way through the
/// pipeline. Transient: created per query, discarded once the result is
/// assembled.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub chunk: Chunk,

    /// Raw cosine similarity, when the candidate came through vector search.
    pub vector_score: Option<f32>,

    /// Raw BM25 score, when the candidate came through keyword search.
    pub keyword_score: Option<f32>,

    /// BM25 score normalized by the best keyword score in this pass.
    pub normalized_keyword: Option<f32>,

    /// Reciprocal-rank-fusion score.
    pub fused_score: f32,

    /// Pairwise rerank score, once reranking has run.
    pub rerank_score: Option<f32>,
}

impl ScoredCandidate {
    /// The most refined relevance estimate available for this candidate:
    /// rerank score, then vector similarity, then normalized keyword score.
    /// Always in [0, 1].
    pub fn relevance(&self) -> f32 {
        if let Some(score) = self.rerank_score {
            score.clamp(0.0, 1.0)
        } else if let Some(score) = self.vector_score {
            score.clamp(0.0, 1.0)
        } else if let Some(score) = self.normalized_keyword {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// One ranked chunk in a retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub chunk: Chunk,

    /// Relevance estimate in [0, 1] (see [`ScoredCandidate::relevance`]).
    pub relevance: f32,
}

/// Which corrective action, if any, produced the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Correction {
    /// First-pass retrieval was good enough.
    None,

    /// The query was expanded with synonyms and retrieval re-ran once.
    QueryExpansion,

    /// External augmentation supplied the final artifacts.
    ExternalFallback,

    /// External augmentation was attempted, returned nothing, and the engine
    /// fell back to the best local result.
    ExternalFallbackFailed,
}

/// Quality assessment attached to every result that went through retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    /// The evaluator's verdict on the pass that produced the artifacts.
    pub verdict: Verdict,

    /// Which correction actually ran.
    pub correction: Correction,

    /// Whether pairwise reranking actually executed for this result. False
    /// when the skip heuristic fired or the scorer was unavailable.
    pub reranked: bool,
}

/// How the result was produced. Fields meaningful only for a particular path
/// live on that variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RetrievalStrategy {
    /// The classifier decided retrieval was unnecessary.
    NoRetrieval { reasoning: String },

    /// A single retrieval pass was sufficient.
    SinglePass { quality: QualityReport },

    /// Retrieval re-ran with an expanded query.
    Corrected {
        quality: QualityReport,
        expanded_query: String,
    },

    /// Artifacts came from the external provider.
    ExternalFallback {
        quality: QualityReport,
        results_used: usize,
    },
}

/// The unit returned to the caller. Constructed fresh per request, immutable
/// once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Ranked best-first.
    pub artifacts: Vec<Artifact>,

    /// Estimated tokens across `artifacts`. Exceeds the requested budget only
    /// when a single artifact is itself larger than the budget.
    pub tokens_used: usize,

    /// Candidates seen before final truncation. Diagnostic only.
    pub candidates_considered: usize,

    /// Wall-clock time for this retrieval. Diagnostic only.
    pub elapsed_ms: u64,

    /// How the result was produced.
    pub strategy: RetrievalStrategy,
}

impl RetrievalResult {
    /// Stable name of the strategy, for logs and metrics.
    pub fn strategy_name(&self) -> &'static str {
        match &self.strategy {
            RetrievalStrategy::NoRetrieval { .. } => "no_retrieval",
            RetrievalStrategy::SinglePass { .. } => "single_pass",
            RetrievalStrategy::Corrected { .. } => "corrected",
            RetrievalStrategy::ExternalFallback { .. } => "external_fallback",
        }
    }

    /// Quality report, when the result went through retrieval.
    pub fn quality(&self) -> Option<&QualityReport> {
        match &self.strategy {
            RetrievalStrategy::NoRetrieval { .. } => None,
            RetrievalStrategy::SinglePass { quality }
            | RetrievalStrategy::Corrected { quality, .. }
            | RetrievalStrategy::ExternalFallback { quality, .. } => Some(quality),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }
}
