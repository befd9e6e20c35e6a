use crate::config::EngineConfig;
use crate::result::ScoredCandidate;
use log::debug;
use serde::{Deserialize, Serialize};
use sift_tokenizer::stopwords;

/// Weight of literal query-keyword presence in the artifact text.
const KEYWORD_WEIGHT: f32 = 0.30;

/// Weight of the variance-penalized mean relevance score.
const COHERENCE_WEIGHT: f32 = 0.40;

/// Weight of total artifact length against the expected minimum.
const LENGTH_WEIGHT: f32 = 0.15;

/// Weight of distinct-source coverage.
const DIVERSITY_WEIGHT: f32 = 0.15;

/// Evaluator's classification of a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictCategory {
    /// Good enough to return as-is.
    Relevant,

    /// Worth one corrective retry with an expanded query.
    Partial,

    /// Needs external augmentation.
    Irrelevant,
}

/// Per-criterion score breakdown, each normalized to [0, 1].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CriterionScores {
    pub keyword_overlap: f32,
    pub semantic_coherence: f32,
    pub length_adequacy: f32,
    pub source_diversity: f32,
}

/// The evaluator's judgment of one retrieval pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub category: VerdictCategory,
    pub score: f32,
    pub criteria: CriterionScores,
}

/// Multi-criterion heuristic scorer classifying a retrieval as sufficient,
/// partially sufficient, or insufficient.
pub struct RelevanceEvaluator {
    relevant_threshold: f32,
    partial_threshold: f32,
    min_tokens_per_chunk: usize,
}

impl RelevanceEvaluator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            relevant_threshold: config.relevant_threshold,
            partial_threshold: config.partial_threshold,
            min_tokens_per_chunk: config.min_tokens_per_chunk,
        }
    }

    /// Evaluate the artifacts retrieved for `query`.
    ///
    /// Zero artifacts is always [`VerdictCategory::Irrelevant`], regardless
    /// of the score math.
    pub fn evaluate(&self, query: &str, candidates: &[ScoredCandidate]) -> Verdict {
        if candidates.is_empty() {
            return Verdict {
                category: VerdictCategory::Irrelevant,
                score: 0.0,
                criteria: CriterionScores::default(),
            };
        }

        let criteria = CriterionScores {
            keyword_overlap: self.keyword_overlap(query, candidates),
            semantic_coherence: Self::semantic_coherence(candidates),
            length_adequacy: self.length_adequacy(candidates),
            source_diversity: Self::source_diversity(candidates),
        };

        let score = KEYWORD_WEIGHT * criteria.keyword_overlap
            + COHERENCE_WEIGHT * criteria.semantic_coherence
            + LENGTH_WEIGHT * criteria.length_adequacy
            + DIVERSITY_WEIGHT * criteria.source_diversity;

        let category = if score > self.relevant_threshold {
            VerdictCategory::Relevant
        } else if score > self.partial_threshold {
            VerdictCategory::Partial
        } else {
            VerdictCategory::Irrelevant
        };

        debug!(
            "Evaluated {} artifacts: score {score:.3} -> {category:?} \
             (keyword {:.2}, coherence {:.2}, length {:.2}, diversity {:.2})",
            candidates.len(),
            criteria.keyword_overlap,
            criteria.semantic_coherence,
            criteria.length_adequacy,
            criteria.source_diversity,
        );

        Verdict {
            category,
            score,
            criteria,
        }
    }

    /// Fraction of query keywords that literally appear in the concatenated
    /// artifact text. An all-stopword query scores 0, not undefined.
    fn keyword_overlap(&self, query: &str, candidates: &[ScoredCandidate]) -> f32 {
        let mut keywords: Vec<String> = query
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
                    .to_lowercase()
            })
            .filter(|w| w.len() > 2 && !stopwords().contains(w.as_str()))
            .collect();
        keywords.sort();
        keywords.dedup();

        if keywords.is_empty() {
            return 0.0;
        }

        let haystack = candidates
            .iter()
            .map(|c| c.chunk.content.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");

        let matched = keywords
            .iter()
            .filter(|k| haystack.contains(k.as_str()))
            .count();
        matched as f32 / keywords.len() as f32
    }

    /// Mean relevance penalized by score variance: a high-average retrieval
    /// with wildly inconsistent scores is less trustworthy than a tightly
    /// clustered one.
    fn semantic_coherence(candidates: &[ScoredCandidate]) -> f32 {
        let scores: Vec<f32> = candidates.iter().map(ScoredCandidate::relevance).collect();
        let mean = scores.iter().sum::<f32>() / scores.len() as f32;
        let variance =
            scores.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / scores.len() as f32;

        (mean * (1.0 - variance.min(0.3))).clamp(0.0, 1.0)
    }

    /// Ratio of total estimated tokens to the expected minimum, capped at 1.
    fn length_adequacy(&self, candidates: &[ScoredCandidate]) -> f32 {
        let total: usize = candidates.iter().map(|c| c.chunk.estimated_tokens()).sum();
        let expected = candidates.len() * self.min_tokens_per_chunk;
        if expected == 0 {
            return 1.0;
        }
        (total as f32 / expected as f32).min(1.0)
    }

    /// Ratio of distinct source documents to artifact count, capped at 1.
    fn source_diversity(candidates: &[ScoredCandidate]) -> f32 {
        let distinct: std::collections::HashSet<&str> = candidates
            .iter()
            .map(|c| c.chunk.source_path.as_str())
            .collect();
        (distinct.len() as f32 / candidates.len() as f32).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sift_chunk::Chunk;

    fn candidate(id: &str, source: &str, content: &str, relevance: f32) -> ScoredCandidate {
        ScoredCandidate {
            chunk: Chunk::new(id, source, content),
            vector_score: None,
            keyword_score: None,
            normalized_keyword: None,
            fused_score: 0.02,
            rerank_score: Some(relevance),
        }
    }

    fn evaluator() -> RelevanceEvaluator {
        RelevanceEvaluator::new(&EngineConfig {
            min_tokens_per_chunk: 10,
            ..Default::default()
        })
    }

    #[test]
    fn test_zero_artifacts_is_always_irrelevant() {
        let verdict = evaluator().evaluate("anything at all", &[]);
        assert_eq!(verdict.category, VerdictCategory::Irrelevant);
        assert_eq!(verdict.score, 0.0);
    }

    #[test]
    fn test_strong_retrieval_is_relevant() {
        let content = "Python is a dynamically typed programming language used widely.";
        let candidates = vec![
            candidate("a", "python.md", content, 0.92),
            candidate("b", "languages.md", content, 0.90),
        ];

        let verdict = evaluator().evaluate("What is Python?", &candidates);
        assert_eq!(verdict.category, VerdictCategory::Relevant);
        assert_eq!(verdict.criteria.keyword_overlap, 1.0);
        assert_eq!(verdict.criteria.source_diversity, 1.0);
    }

    #[test]
    fn test_variance_penalizes_coherence() {
        let content = "some shared content with enough words for the length check";
        let tight = vec![
            candidate("a", "a.md", content, 0.8),
            candidate("b", "b.md", content, 0.8),
        ];
        let scattered = vec![
            candidate("a", "a.md", content, 1.0),
            candidate("b", "b.md", content, 0.0),
        ];

        let tight_verdict = evaluator().evaluate("shared content words", &tight);
        let scattered_verdict = evaluator().evaluate("shared content words", &scattered);

        assert!(
            tight_verdict.criteria.semantic_coherence
                > scattered_verdict.criteria.semantic_coherence
        );
    }

    #[test]
    fn test_all_stopword_query_scores_zero_overlap() {
        let candidates = vec![candidate("a", "a.md", "whatever content", 0.9)];
        let verdict = evaluator().evaluate("what is the", &candidates);
        assert_eq!(verdict.criteria.keyword_overlap, 0.0);
    }

    #[test]
    fn test_length_adequacy_caps_at_one() {
        let long = "word ".repeat(400);
        let candidates = vec![candidate("a", "a.md", &long, 0.9)];
        let verdict = evaluator().evaluate("word", &candidates);
        assert_eq!(verdict.criteria.length_adequacy, 1.0);
    }

    #[test]
    fn test_short_artifacts_lower_length_adequacy() {
        let evaluator = RelevanceEvaluator::new(&EngineConfig::default());
        let candidates = vec![candidate("a", "a.md", "tiny", 0.9)];
        let verdict = evaluator.evaluate("tiny", &candidates);
        assert!(verdict.criteria.length_adequacy < 0.05);
    }

    #[test]
    fn test_repeated_sources_lower_diversity() {
        let content = "content about indexing strategies and related machinery";
        let same_file = vec![
            candidate("a", "one.md", content, 0.9),
            candidate("b", "one.md", content, 0.9),
        ];
        let verdict = evaluator().evaluate("indexing strategies", &same_file);
        assert_eq!(verdict.criteria.source_diversity, 0.5);
    }

    #[test]
    fn test_partial_band() {
        // Keyword overlap 1.0 and moderate coherence with short content puts
        // the aggregate inside (0.50, 0.75].
        let candidates = vec![
            candidate("a", "a.md", "indexing notes", 0.35),
            candidate("b", "b.md", "more indexing notes", 0.35),
        ];

        let verdict = RelevanceEvaluator::new(&EngineConfig {
            min_tokens_per_chunk: 5,
            ..Default::default()
        })
        .evaluate("indexing notes", &candidates);

        assert_eq!(verdict.category, VerdictCategory::Partial);
        assert!(verdict.score > 0.50 && verdict.score <= 0.75);
    }
}
