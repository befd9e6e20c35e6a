use crate::config::EngineConfig;
use crate::error::RerankError;
use crate::result::ScoredCandidate;
use log::debug;
use lru::LruCache;
use sha1::{Digest, Sha1};
use sift_chunk::ChunkId;
use sift_tokenizer::{Tokenizer, stopwords};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Joint (query, candidate) relevance scoring.
///
/// Implementations produce a scalar in [0, 1] strictly from the pair itself,
/// never from the candidate's prior rank. Model-backed cross-encoders plug in
/// behind this trait; scoring happens in fixed-size batches.
pub trait PairScorer: Send + Sync {
    fn score_batch(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>, RerankError>;
}

impl<T: PairScorer + ?Sized> PairScorer for &T {
    fn score_batch(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>, RerankError> {
        (**self).score_batch(query, candidates)
    }
}

impl<T: PairScorer + ?Sized> PairScorer for Box<T> {
    fn score_batch(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>, RerankError> {
        (**self).score_batch(query, candidates)
    }
}

impl<T: PairScorer + ?Sized> PairScorer for std::sync::Arc<T> {
    fn score_batch(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>, RerankError> {
        (**self).score_batch(query, candidates)
    }
}

/// Deterministic lexical pairwise scorer.
///
/// Scores a candidate by how well its content covers the query's content
/// terms, with an exact-phrase bonus and mild length shaping. Serves as the
/// built-in scorer where no model runtime is available.
pub struct LexicalAlignmentScorer {
    tokenizer: Tokenizer,
}

impl Default for LexicalAlignmentScorer {
    fn default() -> Self {
        Self {
            tokenizer: Tokenizer::default(),
        }
    }
}

impl LexicalAlignmentScorer {
    fn score_pair(&self, query: &str, content: &str) -> f32 {
        let content_lower = content.to_lowercase();
        let query_lower = query.to_lowercase();

        let mut terms: Vec<String> = self
            .tokenizer
            .tokenize(query)
            .into_iter()
            .filter(|t| t.len() > 2 && !stopwords().contains(t.as_str()))
            .collect();
        terms.sort();
        terms.dedup();

        let phrase_bonus = if !query_lower.trim().is_empty()
            && content_lower.contains(query_lower.trim())
        {
            1.0
        } else {
            0.0
        };

        let base = if terms.is_empty() {
            0.5 * phrase_bonus
        } else {
            let matched = terms
                .iter()
                .filter(|t| content_lower.contains(t.as_str()))
                .count();
            let coverage = matched as f32 / terms.len() as f32;
            0.75 * coverage + 0.25 * phrase_bonus
        };

        let length_factor = if (80..=4000).contains(&content.len()) {
            1.0
        } else {
            0.85
        };

        (base * length_factor).clamp(0.0, 1.0)
    }
}

impl PairScorer for LexicalAlignmentScorer {
    fn score_batch(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>, RerankError> {
        Ok(candidates
            .iter()
            .map(|content| self.score_pair(query, content))
            .collect())
    }
}

struct CacheEntry {
    scores: Vec<(ChunkId, f32)>,
    inserted_at: Instant,
}

/// Result of a rerank call.
#[derive(Debug)]
pub struct RerankOutcome {
    /// Candidates sorted best-first, threshold-filtered when scoring ran.
    pub candidates: Vec<ScoredCandidate>,

    /// Whether pairwise scoring actually executed.
    pub reranked: bool,

    /// Whether the scores came from the cache.
    pub cache_hit: bool,
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
}

/// Second-stage reranker over fused candidates.
///
/// Short queries and tiny candidate sets skip scoring entirely and pass
/// upstream scores through unchanged; pairwise scoring gains little there and
/// the latency is better spent elsewhere. Scored results are cached by
/// (query, candidate-set) with a TTL; the cache changes latency, never
/// results. The post-score threshold is a soft filter: dropping every
/// candidate is allowed, and the evaluator decides what to do about it.
pub struct Reranker<S: PairScorer> {
    scorer: S,
    config: EngineConfig,
    cache: Option<Mutex<LruCache<String, CacheEntry>>>,
    ttl: Duration,
}

impl<S: PairScorer> Reranker<S> {
    pub fn new(scorer: S, config: EngineConfig) -> Self {
        let cache = if config.enable_rerank_cache {
            let capacity = NonZeroUsize::new(config.rerank_cache_size)
                .unwrap_or(NonZeroUsize::MIN);
            Some(Mutex::new(LruCache::new(capacity)))
        } else {
            None
        };
        let ttl = Duration::from_secs(config.rerank_cache_ttl_secs);

        Self {
            scorer,
            config,
            cache,
            ttl,
        }
    }

    /// Rerank `candidates` for `query`, best-first.
    pub fn rerank(
        &self,
        query: &str,
        candidates: Vec<ScoredCandidate>,
    ) -> Result<RerankOutcome, RerankError> {
        let query_words = query.split_whitespace().count();
        if query_words < self.config.rerank_min_query_words || candidates.len() <= 3 {
            debug!(
                "Skipping rerank: {query_words} query words, {} candidates",
                candidates.len()
            );
            return Ok(RerankOutcome {
                candidates,
                reranked: false,
                cache_hit: false,
            });
        }

        let key = self.cache_key(query, &candidates);

        if let Some(scores) = self.cache_lookup(&key) {
            debug!("Rerank cache hit for query '{query}'");
            let candidates = Self::apply_scores(candidates, &scores, self.config.rerank_threshold);
            return Ok(RerankOutcome {
                candidates,
                reranked: true,
                cache_hit: true,
            });
        }

        let scores = self.score_all(query, &candidates)?;
        self.cache_store(key, &scores);

        let candidates = Self::apply_scores(candidates, &scores, self.config.rerank_threshold);
        debug!("Reranked down to {} candidates", candidates.len());
        Ok(RerankOutcome {
            candidates,
            reranked: true,
            cache_hit: false,
        })
    }

    /// Score every candidate in fixed-size batches. Batching bounds peak
    /// resource use only; output is identical for any batch size.
    fn score_all(
        &self,
        query: &str,
        candidates: &[ScoredCandidate],
    ) -> Result<Vec<(ChunkId, f32)>, RerankError> {
        let mut scores = Vec::with_capacity(candidates.len());

        for batch in candidates.chunks(self.config.rerank_batch_size) {
            let contents: Vec<&str> = batch.iter().map(|c| c.chunk.content.as_str()).collect();
            let batch_scores = self.scorer.score_batch(query, &contents)?;
            if batch_scores.len() != batch.len() {
                return Err(RerankError::ScorerUnavailable(format!(
                    "scorer returned {} scores for a batch of {}",
                    batch_scores.len(),
                    batch.len()
                )));
            }
            for (candidate, score) in batch.iter().zip(batch_scores) {
                scores.push((candidate.chunk.id.clone(), score));
            }
        }

        Ok(scores)
    }

    fn apply_scores(
        mut candidates: Vec<ScoredCandidate>,
        scores: &[(ChunkId, f32)],
        threshold: f32,
    ) -> Vec<ScoredCandidate> {
        let by_id: HashMap<&ChunkId, f32> = scores.iter().map(|(id, s)| (id, *s)).collect();

        for candidate in &mut candidates {
            candidate.rerank_score = by_id.get(&candidate.chunk.id).copied();
        }
        candidates.retain(|c| c.rerank_score.is_some_and(|s| s >= threshold));
        candidates.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        candidates
    }

    /// Cache key: hash of the query and the sorted candidate id set.
    fn cache_key(&self, query: &str, candidates: &[ScoredCandidate]) -> String {
        let mut ids: Vec<&str> = candidates.iter().map(|c| c.chunk.id.as_str()).collect();
        ids.sort_unstable();

        let mut hasher = Sha1::new();
        hasher.update(query.as_bytes());
        hasher.update([0u8]);
        for id in ids {
            hasher.update(id.as_bytes());
            hasher.update([0x1fu8]);
        }

        use std::fmt::Write;
        let digest = hasher.finalize();
        let mut key = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(key, "{byte:02x}");
        }
        key
    }

    fn cache_lookup(&self, key: &str) -> Option<Vec<(ChunkId, f32)>> {
        let cache = self.cache.as_ref()?;
        let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = cache.get(key)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.scores.clone())
    }

    fn cache_store(&self, key: String, scores: &[(ChunkId, f32)]) {
        if let Some(cache) = self.cache.as_ref() {
            let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
            cache.put(
                key,
                CacheEntry {
                    scores: scores.to_vec(),
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        match self.cache.as_ref() {
            Some(cache) => {
                let cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
                CacheStats {
                    size: cache.len(),
                    capacity: cache.cap().get(),
                }
            }
            None => CacheStats {
                size: 0,
                capacity: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sift_chunk::Chunk;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores by content marker, counting how many items were scored.
    struct MarkerScorer {
        scored: AtomicUsize,
    }

    impl MarkerScorer {
        fn new() -> Self {
            Self {
                scored: AtomicUsize::new(0),
            }
        }
    }

    impl PairScorer for MarkerScorer {
        fn score_batch(&self, _query: &str, candidates: &[&str]) -> Result<Vec<f32>, RerankError> {
            self.scored.fetch_add(candidates.len(), Ordering::SeqCst);
            Ok(candidates
                .iter()
                .map(|content| {
                    if content.contains("good") {
                        0.9
                    } else if content.contains("meh") {
                        0.5
                    } else {
                        0.1
                    }
                })
                .collect())
        }
    }

    struct FailingScorer;

    impl PairScorer for FailingScorer {
        fn score_batch(&self, _query: &str, _candidates: &[&str]) -> Result<Vec<f32>, RerankError> {
            Err(RerankError::ScorerUnavailable("model offline".to_string()))
        }
    }

    fn candidate(id: &str, content: &str) -> ScoredCandidate {
        ScoredCandidate {
            chunk: Chunk::new(id, format!("{id}.md"), content),
            vector_score: Some(0.5),
            keyword_score: None,
            normalized_keyword: None,
            fused_score: 0.02,
            rerank_score: None,
        }
    }

    fn candidates() -> Vec<ScoredCandidate> {
        vec![
            candidate("a", "meh content about retrieval"),
            candidate("b", "nothing relevant here"),
            candidate("c", "good content about retrieval"),
            candidate("d", "also nothing relevant"),
        ]
    }

    const LONG_QUERY: &str = "how does the retrieval cache handle timeouts";

    #[test]
    fn test_short_query_skips_scoring() {
        let scorer = MarkerScorer::new();
        let reranker = Reranker::new(&scorer, EngineConfig::default());

        let outcome = reranker.rerank("cache timeout", candidates()).unwrap();

        assert!(!outcome.reranked);
        assert_eq!(scorer.scored.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.candidates.len(), 4);
        assert_eq!(outcome.candidates[0].chunk.id.as_str(), "a");
    }

    #[test]
    fn test_small_candidate_set_skips_scoring() {
        let scorer = MarkerScorer::new();
        let reranker = Reranker::new(&scorer, EngineConfig::default());

        let outcome = reranker
            .rerank(LONG_QUERY, candidates().into_iter().take(3).collect())
            .unwrap();

        assert!(!outcome.reranked);
        assert_eq!(scorer.scored.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rerank_orders_by_joint_score_not_fused_rank() {
        let scorer = MarkerScorer::new();
        let reranker = Reranker::new(&scorer, EngineConfig::default());

        let outcome = reranker.rerank(LONG_QUERY, candidates()).unwrap();

        assert!(outcome.reranked);
        // "good" (0.9) outranks "meh" (0.5); 0.1 candidates fall below 0.35.
        let ids: Vec<&str> = outcome
            .candidates
            .iter()
            .map(|c| c.chunk.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn test_threshold_monotonicity() {
        let scorer = MarkerScorer::new();
        let lenient = Reranker::new(
            &scorer,
            EngineConfig {
                rerank_threshold: 0.05,
                ..Default::default()
            },
        );
        let strict = Reranker::new(
            &scorer,
            EngineConfig {
                rerank_threshold: 0.7,
                ..Default::default()
            },
        );

        let lenient_count = lenient.rerank(LONG_QUERY, candidates()).unwrap().candidates.len();
        let strict_count = strict.rerank(LONG_QUERY, candidates()).unwrap().candidates.len();

        assert_eq!(lenient_count, 4);
        assert_eq!(strict_count, 1);
        assert!(strict_count <= lenient_count);
    }

    #[test]
    fn test_batch_size_does_not_change_output() {
        let scorer_a = MarkerScorer::new();
        let scorer_b = MarkerScorer::new();
        let one_at_a_time = Reranker::new(
            &scorer_a,
            EngineConfig {
                rerank_batch_size: 1,
                ..Default::default()
            },
        );
        let all_at_once = Reranker::new(
            &scorer_b,
            EngineConfig {
                rerank_batch_size: 32,
                ..Default::default()
            },
        );

        let out_a = one_at_a_time.rerank(LONG_QUERY, candidates()).unwrap();
        let out_b = all_at_once.rerank(LONG_QUERY, candidates()).unwrap();

        let scores_a: Vec<(String, Option<f32>)> = out_a
            .candidates
            .iter()
            .map(|c| (c.chunk.id.to_string(), c.rerank_score))
            .collect();
        let scores_b: Vec<(String, Option<f32>)> = out_b
            .candidates
            .iter()
            .map(|c| (c.chunk.id.to_string(), c.rerank_score))
            .collect();
        assert_eq!(scores_a, scores_b);
    }

    #[test]
    fn test_cache_hit_skips_rescoring() {
        let scorer = MarkerScorer::new();
        let reranker = Reranker::new(&scorer, EngineConfig::default());

        let first = reranker.rerank(LONG_QUERY, candidates()).unwrap();
        let scored_after_first = scorer.scored.load(Ordering::SeqCst);
        let second = reranker.rerank(LONG_QUERY, candidates()).unwrap();

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(scorer.scored.load(Ordering::SeqCst), scored_after_first);

        let first_scores: Vec<Option<f32>> =
            first.candidates.iter().map(|c| c.rerank_score).collect();
        let second_scores: Vec<Option<f32>> =
            second.candidates.iter().map(|c| c.rerank_score).collect();
        assert_eq!(first_scores, second_scores);
    }

    #[test]
    fn test_disabled_cache_changes_latency_not_results() {
        let scorer = MarkerScorer::new();
        let reranker = Reranker::new(
            &scorer,
            EngineConfig {
                enable_rerank_cache: false,
                ..Default::default()
            },
        );

        let first = reranker.rerank(LONG_QUERY, candidates()).unwrap();
        let second = reranker.rerank(LONG_QUERY, candidates()).unwrap();

        assert!(!second.cache_hit);
        assert_eq!(scorer.scored.load(Ordering::SeqCst), 8);

        let first_ids: Vec<String> = first
            .candidates
            .iter()
            .map(|c| c.chunk.id.to_string())
            .collect();
        let second_ids: Vec<String> = second
            .candidates
            .iter()
            .map(|c| c.chunk.id.to_string())
            .collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_expired_entries_are_rescored() {
        let scorer = MarkerScorer::new();
        let reranker = Reranker::new(
            &scorer,
            EngineConfig {
                rerank_cache_ttl_secs: 0,
                ..Default::default()
            },
        );

        reranker.rerank(LONG_QUERY, candidates()).unwrap();
        let second = reranker.rerank(LONG_QUERY, candidates()).unwrap();

        assert!(!second.cache_hit);
        assert_eq!(scorer.scored.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_scorer_failure_propagates() {
        let reranker = Reranker::new(FailingScorer, EngineConfig::default());
        let err = reranker.rerank(LONG_QUERY, candidates()).unwrap_err();
        assert!(matches!(err, RerankError::ScorerUnavailable(_)));
    }

    #[test]
    fn test_threshold_may_drop_every_candidate() {
        let scorer = MarkerScorer::new();
        let reranker = Reranker::new(
            &scorer,
            EngineConfig {
                rerank_threshold: 0.99,
                ..Default::default()
            },
        );

        let outcome = reranker.rerank(LONG_QUERY, candidates()).unwrap();
        assert!(outcome.reranked);
        assert!(outcome.candidates.is_empty());
    }

    #[test]
    fn test_lexical_scorer_coverage() {
        let scorer = LexicalAlignmentScorer::default();
        let scores = scorer
            .score_batch(
                "configure retrieval cache timeout behavior",
                &[
                    "The retrieval cache timeout can be configured per engine instance and defaults to one hour.",
                    "Unrelated notes about palette colors.",
                ],
            )
            .unwrap();

        assert!(scores[0] > 0.5);
        assert!(scores[1] < 0.2);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }
}
