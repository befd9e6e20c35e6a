/*!
# Hybrid Retrieval-and-Correction Engine

Two-stage hybrid retrieval for grounding chat answers in an indexed corpus:

- **Dual-index search**: vector similarity and BM25 keyword search run
  concurrently over the same corpus
- **Reciprocal Rank Fusion (RRF)**: merges the two rankings without score
  normalization
- **Pairwise reranking**: joint (query, candidate) scoring with a result
  cache and a cheap skip heuristic
- **Adaptive routing**: a sub-millisecond classifier skips retrieval for
  queries that do not need it
- **Corrective evaluation**: a multi-criterion evaluator grades every
  retrieval and triggers query expansion or external fallback before the
  result reaches the caller

## Architecture

```text
Query
  └─> Strategy Classifier ──(no retrieval)──> empty result
        └─> Vector Search ─┐
        └─> Keyword Search ┴─> RRF Fusion
              └─> Reranker (skip / cache / threshold)
                    └─> Relevance Evaluator
                          ├─ RELEVANT  ─> result
                          ├─ PARTIAL   ─> Query Expander ─> one retry
                          └─ IRRELEVANT─> External Augmenter ─> result
```

## Example

```rust,no_run
use sift_embeddings::HashingEmbedder;
use sift_index::{KeywordIndex, VectorIndex};
use sift_retrieval::{EngineConfig, RetrievalEngine};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let vector_index = Arc::new(VectorIndex::load(Path::new("vectors.json"))?);
    let keyword_index = Arc::new(KeywordIndex::load(Path::new("keywords.json"))?);
    let embedder = Arc::new(HashingEmbedder::new(vector_index.dimension()));

    let engine = RetrievalEngine::new(
        EngineConfig::default(),
        vector_index,
        keyword_index,
        embedder,
    )?;

    let result = engine.retrieve("how does fusion rank candidates?").await?;
    for artifact in &result.artifacts {
        println!("{} ({:.2})", artifact.chunk.source_path, artifact.relevance);
    }
    println!("strategy: {}", result.strategy_name());

    Ok(())
}
```

Every dependency (indexes, embedder, scorer, provider) is injected at
construction; two engines with different configurations can coexist in one
process.
*/

mod augment;
mod classify;
mod config;
mod engine;
mod error;
mod evaluate;
mod expand;
mod fusion;
mod rerank;
mod result;

pub use augment::{ExternalAugmenter, ProviderResult, SearchProvider};
pub use classify::{Classification, Strategy, StrategyClassifier};
pub use config::EngineConfig;
pub use engine::RetrievalEngine;
pub use error::{RerankError, Result, RetrievalError};
pub use evaluate::{CriterionScores, RelevanceEvaluator, Verdict, VerdictCategory};
pub use expand::QueryExpander;
pub use fusion::{FusedEntry, reciprocal_rank_fusion};
pub use rerank::{CacheStats, LexicalAlignmentScorer, PairScorer, Reranker, RerankOutcome};
pub use result::{
    Artifact, Correction, QualityReport, RetrievalResult, RetrievalStrategy, ScoredCandidate,
};
