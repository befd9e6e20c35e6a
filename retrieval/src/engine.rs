use crate::augment::ExternalAugmenter;
use crate::classify::{Strategy, StrategyClassifier};
use crate::config::EngineConfig;
use crate::error::{Result, RetrievalError};
use crate::evaluate::{RelevanceEvaluator, Verdict, VerdictCategory};
use crate::expand::QueryExpander;
use crate::fusion::reciprocal_rank_fusion;
use crate::rerank::{CacheStats, LexicalAlignmentScorer, PairScorer, Reranker};
use crate::result::{
    Artifact, Correction, QualityReport, RetrievalResult, RetrievalStrategy, ScoredCandidate,
};
use log::{debug, info, warn};
use sift_chunk::{Chunk, ChunkId};
use sift_embeddings::Embedder;
use sift_index::{KeywordIndex, VectorIndex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// One completed retrieve→rerank pass.
struct PassOutcome {
    candidates: Vec<ScoredCandidate>,
    considered: usize,
    reranked: bool,
}

/// A pass together with its evaluation, kept so the engine can fall back to
/// the best local result when every correction fails.
struct Attempt {
    outcome: PassOutcome,
    verdict: Verdict,
    expanded_query: Option<String>,
}

/// Top-level retrieval coordinator.
///
/// Sequences classification, concurrent dual-index search, rank fusion,
/// reranking, evaluation, and correction. Every dependency is injected at
/// construction and shared read-only across concurrent requests; component
/// failures below this layer degrade to the best available result, and only
/// validation and structural failures reach the caller.
pub struct RetrievalEngine {
    config: EngineConfig,
    vector_index: Arc<VectorIndex>,
    keyword_index: Arc<KeywordIndex>,
    embedder: Arc<dyn Embedder>,
    classifier: StrategyClassifier,
    reranker: Arc<Reranker<Box<dyn PairScorer>>>,
    evaluator: RelevanceEvaluator,
    expander: QueryExpander,
    augmenter: Option<ExternalAugmenter>,
}

impl RetrievalEngine {
    /// Create an engine with the built-in scorer and expander. Components can
    /// be swapped with the `with_*` builders before first use.
    pub fn new(
        config: EngineConfig,
        vector_index: Arc<VectorIndex>,
        keyword_index: Arc<KeywordIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        config.validate().map_err(RetrievalError::InvalidConfig)?;

        info!(
            "Initializing retrieval engine: {} chunks, dimension {}",
            vector_index.len(),
            vector_index.dimension()
        );

        let classifier = StrategyClassifier::new(config.enable_multi_step);
        let scorer: Box<dyn PairScorer> = Box::new(LexicalAlignmentScorer::default());
        let reranker = Arc::new(Reranker::new(scorer, config.clone()));
        let evaluator = RelevanceEvaluator::new(&config);
        let expander = QueryExpander::with_default_table(config.synonym_limit);

        Ok(Self {
            config,
            vector_index,
            keyword_index,
            embedder,
            classifier,
            reranker,
            evaluator,
            expander,
            augmenter: None,
        })
    }

    /// Replace the pairwise scorer.
    pub fn with_scorer(mut self, scorer: Box<dyn PairScorer>) -> Self {
        self.reranker = Arc::new(Reranker::new(scorer, self.config.clone()));
        self
    }

    /// Replace the query expander.
    pub fn with_expander(mut self, expander: QueryExpander) -> Self {
        self.expander = expander;
        self
    }

    /// Attach an external augmenter. Without one, irrelevant retrievals fall
    /// back to the best local result.
    pub fn with_augmenter(mut self, augmenter: ExternalAugmenter) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.reranker.cache_stats()
    }

    /// Retrieve with the configured token budget and artifact limit.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        self.retrieve_with_budget(query, self.config.token_budget, self.config.max_artifacts)
            .await
    }

    /// Retrieve with an explicit token budget and artifact limit.
    pub async fn retrieve_with_budget(
        &self,
        query: &str,
        token_budget: usize,
        max_artifacts: usize,
    ) -> Result<RetrievalResult> {
        let started = Instant::now();

        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let classification = self.classifier.classify(query);
        if classification.strategy == Strategy::NoRetrieval {
            info!("Skipping retrieval: {}", classification.reasoning);
            return Ok(RetrievalResult {
                artifacts: Vec::new(),
                tokens_used: 0,
                candidates_considered: 0,
                elapsed_ms: elapsed_ms(started),
                strategy: RetrievalStrategy::NoRetrieval {
                    reasoning: classification.reasoning,
                },
            });
        }

        let mut candidates_considered = 0;
        let mut attempts: Vec<Attempt> = Vec::new();

        let first = self.run_pass(query, max_artifacts).await?;
        candidates_considered += first.considered;
        let first_verdict = self.evaluator.evaluate(query, &first.candidates);
        debug!(
            "First pass: {:?} ({:.3})",
            first_verdict.category, first_verdict.score
        );

        match first_verdict.category {
            VerdictCategory::Relevant => {
                let attempt = Attempt {
                    outcome: first,
                    verdict: first_verdict,
                    expanded_query: None,
                };
                return Ok(self.assemble(
                    started,
                    candidates_considered,
                    attempt,
                    Correction::None,
                    token_budget,
                    max_artifacts,
                ));
            }
            VerdictCategory::Partial => {
                let expanded = self.expander.expand(query);
                if expanded == query {
                    // Nothing to expand with; the partial result stands.
                    let attempt = Attempt {
                        outcome: first,
                        verdict: first_verdict,
                        expanded_query: None,
                    };
                    return Ok(self.assemble(
                        started,
                        candidates_considered,
                        attempt,
                        Correction::None,
                        token_budget,
                        max_artifacts,
                    ));
                }

                info!("Partial verdict; retrying once with expanded query");
                attempts.push(Attempt {
                    outcome: first,
                    verdict: first_verdict,
                    expanded_query: None,
                });

                let second = self.run_pass(&expanded, max_artifacts).await?;
                candidates_considered += second.considered;
                let second_verdict = self.evaluator.evaluate(query, &second.candidates);
                debug!(
                    "Corrected pass: {:?} ({:.3})",
                    second_verdict.category, second_verdict.score
                );

                let irrelevant = second_verdict.category == VerdictCategory::Irrelevant;
                let attempt = Attempt {
                    outcome: second,
                    verdict: second_verdict,
                    expanded_query: Some(expanded),
                };

                if !irrelevant {
                    // Relevant, or a second Partial accepted as final; the
                    // one-retry limit is structural, never a loop.
                    return Ok(self.assemble(
                        started,
                        candidates_considered,
                        attempt,
                        Correction::QueryExpansion,
                        token_budget,
                        max_artifacts,
                    ));
                }
                attempts.push(attempt);
            }
            VerdictCategory::Irrelevant => {
                attempts.push(Attempt {
                    outcome: first,
                    verdict: first_verdict,
                    expanded_query: None,
                });
            }
        }

        self.augment_or_fall_back(
            started,
            query,
            candidates_considered,
            attempts,
            token_budget,
            max_artifacts,
        )
        .await
    }

    /// AUGMENT state: consult the external provider, and if that yields
    /// nothing, return the best local attempt rather than failing.
    async fn augment_or_fall_back(
        &self,
        started: Instant,
        query: &str,
        candidates_considered: usize,
        attempts: Vec<Attempt>,
        token_budget: usize,
        max_artifacts: usize,
    ) -> Result<RetrievalResult> {
        let mut augment_attempted = false;

        if self.config.enable_external_fallback {
            if let Some(augmenter) = &self.augmenter {
                augment_attempted = true;
                let external = augmenter.augment(query).await;

                if !external.is_empty() {
                    info!("External fallback supplied {} results", external.len());
                    let results_used = external.len();
                    let (artifacts, tokens_used) =
                        pack(external.into_iter(), token_budget, max_artifacts);
                    let verdict = last_verdict(&attempts);
                    return Ok(RetrievalResult {
                        artifacts,
                        tokens_used,
                        candidates_considered,
                        elapsed_ms: elapsed_ms(started),
                        strategy: RetrievalStrategy::ExternalFallback {
                            quality: QualityReport {
                                verdict,
                                correction: Correction::ExternalFallback,
                                // External artifacts never go through the
                                // reranker.
                                reranked: false,
                            },
                            results_used,
                        },
                    });
                }
                warn!("External fallback returned nothing; using best local result");
            }
        }

        let best = best_attempt(attempts);
        let correction = if augment_attempted {
            Correction::ExternalFallbackFailed
        } else if best.expanded_query.is_some() {
            Correction::QueryExpansion
        } else {
            Correction::None
        };

        Ok(self.assemble(
            started,
            candidates_considered,
            best,
            correction,
            token_budget,
            max_artifacts,
        ))
    }

    /// One RETRIEVE → RERANK pass over the indexes.
    async fn run_pass(&self, query: &str, max_artifacts: usize) -> Result<PassOutcome> {
        let k = self.config.stage1_candidate_count;

        // Vector and keyword searches are independent; run them concurrently.
        let (vector_results, keyword_results) =
            tokio::join!(self.vector_search(query, k), self.keyword_search(query, k));
        let vector_results = vector_results?;
        let keyword_results = keyword_results?;

        let considered = vector_results.len() + keyword_results.len();
        debug!(
            "Stage 1: {} vector + {} keyword candidates",
            vector_results.len(),
            keyword_results.len()
        );

        let vector_ids: Vec<ChunkId> = vector_results.iter().map(|(id, _)| id.clone()).collect();
        let keyword_ids: Vec<ChunkId> = keyword_results.iter().map(|(id, _)| id.clone()).collect();
        let fused = reciprocal_rank_fusion(&vector_ids, &keyword_ids, self.config.rrf_k_const, k);

        let vector_scores: HashMap<&ChunkId, f32> =
            vector_results.iter().map(|(id, s)| (id, *s)).collect();
        let keyword_scores: HashMap<&ChunkId, f32> =
            keyword_results.iter().map(|(id, s)| (id, *s)).collect();
        let max_keyword = keyword_results
            .iter()
            .map(|(_, s)| *s)
            .fold(0.0f32, f32::max);

        let mut candidates = Vec::with_capacity(fused.len());
        for entry in fused {
            let Some(chunk) = self.vector_index.chunk(&entry.id) else {
                debug!("Fused candidate '{}' not present in vector index", entry.id);
                continue;
            };
            let keyword_score = keyword_scores.get(&entry.id).copied();
            candidates.push(ScoredCandidate {
                chunk: chunk.clone(),
                vector_score: vector_scores.get(&entry.id).copied(),
                keyword_score,
                normalized_keyword: keyword_score
                    .map(|s| if max_keyword > 0.0 { s / max_keyword } else { 0.0 }),
                fused_score: entry.score,
                rerank_score: None,
            });
        }

        // RERANK, degrading to fused ordering if the scorer is unavailable.
        let fallback = candidates.clone();
        let reranker = self.reranker.clone();
        let rerank_query = query.to_string();
        let (mut candidates, reranked) =
            match tokio::task::spawn_blocking(move || reranker.rerank(&rerank_query, candidates))
                .await
            {
                Ok(Ok(outcome)) => (outcome.candidates, outcome.reranked),
                Ok(Err(e)) => {
                    warn!("Reranker unavailable, keeping fused ordering: {e}");
                    (fallback, false)
                }
                Err(e) => {
                    warn!("Rerank task failed, keeping fused ordering: {e}");
                    (fallback, false)
                }
            };

        candidates.truncate(max_artifacts);
        Ok(PassOutcome {
            candidates,
            considered,
            reranked,
        })
    }

    /// Vector half of stage 1. A query-embedding failure degrades the pass to
    /// keyword-only rather than failing the request; an index-level dimension
    /// mismatch is structural and propagates.
    async fn vector_search(&self, query: &str, k: usize) -> Result<Vec<(ChunkId, f32)>> {
        let embedder = self.embedder.clone();
        let embed_query = query.to_string();
        let embedding =
            match tokio::task::spawn_blocking(move || embedder.embed_one(&embed_query)).await {
                Ok(Ok(embedding)) => embedding,
                Ok(Err(e)) => {
                    warn!("Query embedding failed, continuing keyword-only: {e}");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(RetrievalError::Internal(e.to_string())),
            };

        let index = self.vector_index.clone();
        match tokio::task::spawn_blocking(move || index.search(&embedding, k)).await {
            Ok(result) => result.map_err(RetrievalError::Index),
            Err(e) => Err(RetrievalError::Internal(e.to_string())),
        }
    }

    /// Keyword half of stage 1.
    async fn keyword_search(&self, query: &str, k: usize) -> Result<Vec<(ChunkId, f32)>> {
        let index = self.keyword_index.clone();
        let search_query = query.to_string();
        tokio::task::spawn_blocking(move || index.search(&search_query, k))
            .await
            .map_err(|e| RetrievalError::Internal(e.to_string()))
    }

    /// Terminal DONE state for locally produced artifacts.
    fn assemble(
        &self,
        started: Instant,
        candidates_considered: usize,
        attempt: Attempt,
        correction: Correction,
        token_budget: usize,
        max_artifacts: usize,
    ) -> RetrievalResult {
        let (artifacts, tokens_used) = pack(
            attempt.outcome.candidates.into_iter().map(|c| {
                let relevance = c.relevance();
                (c.chunk, relevance)
            }),
            token_budget,
            max_artifacts,
        );

        let quality = QualityReport {
            verdict: attempt.verdict,
            correction,
            reranked: attempt.outcome.reranked,
        };
        let strategy = match attempt.expanded_query {
            Some(expanded_query) => RetrievalStrategy::Corrected {
                quality,
                expanded_query,
            },
            None => RetrievalStrategy::SinglePass { quality },
        };

        let result = RetrievalResult {
            artifacts,
            tokens_used,
            candidates_considered,
            elapsed_ms: elapsed_ms(started),
            strategy,
        };
        info!(
            "Retrieval completed in {}ms: {} artifacts via {}",
            result.elapsed_ms,
            result.len(),
            result.strategy_name()
        );
        result
    }
}

/// Greedy best-first packing under the token budget. Packing stops at the
/// first candidate that does not fit; the first candidate is always included
/// so a nonempty candidate list never packs to zero artifacts.
fn pack(
    items: impl Iterator<Item = (Chunk, f32)>,
    token_budget: usize,
    max_artifacts: usize,
) -> (Vec<Artifact>, usize) {
    let mut artifacts = Vec::new();
    let mut tokens_used = 0;

    for (chunk, relevance) in items.take(max_artifacts) {
        let cost = chunk.estimated_tokens();

        if artifacts.is_empty() {
            tokens_used += cost;
            artifacts.push(Artifact { chunk, relevance });
            if tokens_used > token_budget {
                break;
            }
            continue;
        }

        if tokens_used + cost > token_budget {
            break;
        }
        tokens_used += cost;
        artifacts.push(Artifact { chunk, relevance });
    }

    (artifacts, tokens_used)
}

/// Highest-scoring attempt; the earliest wins ties.
fn best_attempt(attempts: Vec<Attempt>) -> Attempt {
    let mut best: Option<Attempt> = None;
    for attempt in attempts {
        let better = best
            .as_ref()
            .is_none_or(|b| attempt.verdict.score > b.verdict.score);
        if better {
            best = Some(attempt);
        }
    }
    best.unwrap_or(Attempt {
        outcome: PassOutcome {
            candidates: Vec::new(),
            considered: 0,
            reranked: false,
        },
        verdict: Verdict {
            category: VerdictCategory::Irrelevant,
            score: 0.0,
            criteria: Default::default(),
        },
        expanded_query: None,
    })
}

fn last_verdict(attempts: &[Attempt]) -> Verdict {
    attempts.last().map(|a| a.verdict.clone()).unwrap_or(Verdict {
        category: VerdictCategory::Irrelevant,
        score: 0.0,
        criteria: Default::default(),
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sift_embeddings::HashingEmbedder;
    use sift_tokenizer::TokenizerMode;

    fn chunk(id: &str, source: &str, content: &str, embedder: &HashingEmbedder) -> Chunk {
        let embedding = embedder.embed_one(content).unwrap();
        Chunk::new(id, source, content).with_embedding(embedding)
    }

    fn engine_over(contents: &[(&str, &str)]) -> RetrievalEngine {
        let embedder = HashingEmbedder::new(64);
        let chunks: Vec<Chunk> = contents
            .iter()
            .enumerate()
            .map(|(i, (source, content))| chunk(&format!("c{i}"), source, content, &embedder))
            .collect();

        let vector_index = Arc::new(VectorIndex::build(chunks.clone()).unwrap());
        let keyword_index = Arc::new(KeywordIndex::build(&chunks, TokenizerMode::CodeAware));

        RetrievalEngine::new(
            EngineConfig::default(),
            vector_index,
            keyword_index,
            Arc::new(embedder),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_query_is_a_validation_error() {
        let engine = engine_over(&[("a.md", "some indexed text")]);
        let err = engine.retrieve("   ").await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmptyQuery));
    }

    #[tokio::test]
    async fn test_greeting_takes_no_retrieval_fast_path() {
        let engine = engine_over(&[("a.md", "some indexed text")]);
        let result = engine.retrieve("Hello").await.unwrap();

        assert!(result.artifacts.is_empty());
        assert_eq!(result.strategy_name(), "no_retrieval");
        assert_eq!(result.candidates_considered, 0);
    }

    #[tokio::test]
    async fn test_arithmetic_takes_no_retrieval_fast_path() {
        let engine = engine_over(&[("a.md", "some indexed text")]);
        let result = engine.retrieve("What is 12 * 7?").await.unwrap();

        assert!(result.artifacts.is_empty());
        assert_eq!(result.strategy_name(), "no_retrieval");
    }

    #[test]
    fn test_pack_respects_budget() {
        let items = (0..5).map(|i| (Chunk::new(format!("c{i}"), "f", "x".repeat(400)), 0.9));
        // Each chunk is 100 estimated tokens.
        let (artifacts, tokens_used) = pack(items, 250, 10);

        assert_eq!(artifacts.len(), 2);
        assert_eq!(tokens_used, 200);
    }

    #[test]
    fn test_pack_always_returns_at_least_one() {
        let items = std::iter::once((Chunk::new("big", "f", "x".repeat(4000)), 0.9));
        let (artifacts, tokens_used) = pack(items, 10, 10);

        assert_eq!(artifacts.len(), 1);
        assert!(tokens_used > 10);
    }

    #[test]
    fn test_pack_honors_max_artifacts() {
        let items = (0..5).map(|i| (Chunk::new(format!("c{i}"), "f", "tiny"), 0.9));
        let (artifacts, _) = pack(items, 10_000, 2);
        assert_eq!(artifacts.len(), 2);
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let embedder = HashingEmbedder::new(64);
        let vector_index = Arc::new(VectorIndex::build(Vec::new()).unwrap());
        let keyword_index = Arc::new(KeywordIndex::build(&[], TokenizerMode::CodeAware));

        let err = RetrievalEngine::new(
            EngineConfig {
                token_budget: 0,
                ..Default::default()
            },
            vector_index,
            keyword_index,
            Arc::new(embedder),
        )
        .map(|_| ())
        .unwrap_err();

        assert!(matches!(err, RetrievalError::InvalidConfig(_)));
    }
}
