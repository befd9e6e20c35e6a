use serde::{Deserialize, Serialize};

/// Configuration for the retrieval engine.
///
/// Immutable once constructed and passed explicitly into the engine, so two
/// engines with different configurations can coexist in one process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// RRF constant k. Lower values concentrate weight on top-ranked items
    /// from either list; higher values flatten influence.
    #[serde(default = "default_rrf_k_const")]
    pub rrf_k_const: f32,

    /// How many chunks proceed from each raw search into fusion/reranking.
    #[serde(default = "default_stage1_candidate_count")]
    pub stage1_candidate_count: usize,

    /// Post-rerank relevance cutoff. A soft filter; the evaluator remains
    /// the authoritative decision point.
    #[serde(default = "default_rerank_threshold")]
    pub rerank_threshold: f32,

    /// Queries with fewer words than this skip pairwise reranking.
    #[serde(default = "default_rerank_min_query_words")]
    pub rerank_min_query_words: usize,

    /// Batch size for pairwise scoring. A performance knob only; it never
    /// changes output order or values.
    #[serde(default = "default_rerank_batch_size")]
    pub rerank_batch_size: usize,

    /// Enable the rerank result cache.
    #[serde(default = "default_true")]
    pub enable_rerank_cache: bool,

    /// Number of (query, candidate-set) entries the rerank cache holds.
    #[serde(default = "default_rerank_cache_size")]
    pub rerank_cache_size: usize,

    /// Rerank cache entry lifetime in seconds.
    #[serde(default = "default_rerank_cache_ttl_secs")]
    pub rerank_cache_ttl_secs: u64,

    /// Evaluator score above which a retrieval is relevant.
    #[serde(default = "default_relevant_threshold")]
    pub relevant_threshold: f32,

    /// Evaluator score above which a retrieval is partially relevant.
    #[serde(default = "default_partial_threshold")]
    pub partial_threshold: f32,

    /// Expected minimum token count per artifact for length adequacy.
    #[serde(default = "default_min_tokens_per_chunk")]
    pub min_tokens_per_chunk: usize,

    /// Per-request token packing ceiling.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Maximum number of artifacts returned per request.
    #[serde(default = "default_max_artifacts")]
    pub max_artifacts: usize,

    /// Maximum synonyms appended per matched query token.
    #[serde(default = "default_synonym_limit")]
    pub synonym_limit: usize,

    /// Hard timeout for the external provider call, in seconds.
    #[serde(default = "default_augment_timeout_secs")]
    pub augment_timeout_secs: u64,

    /// Allow the classifier to route to multi-step strategies.
    #[serde(default)]
    pub enable_multi_step: bool,

    /// Allow the engine to fall back to the external augmenter.
    #[serde(default = "default_true")]
    pub enable_external_fallback: bool,
}

fn default_rrf_k_const() -> f32 {
    60.0
}

fn default_stage1_candidate_count() -> usize {
    100
}

fn default_rerank_threshold() -> f32 {
    0.35
}

fn default_rerank_min_query_words() -> usize {
    5
}

fn default_rerank_batch_size() -> usize {
    32
}

fn default_rerank_cache_size() -> usize {
    256
}

fn default_rerank_cache_ttl_secs() -> u64 {
    3600
}

fn default_relevant_threshold() -> f32 {
    0.75
}

fn default_partial_threshold() -> f32 {
    0.50
}

fn default_min_tokens_per_chunk() -> usize {
    100
}

fn default_token_budget() -> usize {
    8000
}

fn default_max_artifacts() -> usize {
    10
}

fn default_synonym_limit() -> usize {
    2
}

fn default_augment_timeout_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rrf_k_const: default_rrf_k_const(),
            stage1_candidate_count: default_stage1_candidate_count(),
            rerank_threshold: default_rerank_threshold(),
            rerank_min_query_words: default_rerank_min_query_words(),
            rerank_batch_size: default_rerank_batch_size(),
            enable_rerank_cache: true,
            rerank_cache_size: default_rerank_cache_size(),
            rerank_cache_ttl_secs: default_rerank_cache_ttl_secs(),
            relevant_threshold: default_relevant_threshold(),
            partial_threshold: default_partial_threshold(),
            min_tokens_per_chunk: default_min_tokens_per_chunk(),
            token_budget: default_token_budget(),
            max_artifacts: default_max_artifacts(),
            synonym_limit: default_synonym_limit(),
            augment_timeout_secs: default_augment_timeout_secs(),
            enable_multi_step: false,
            enable_external_fallback: true,
        }
    }
}

impl EngineConfig {
    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.rrf_k_const <= 0.0 {
            return Err(format!("rrf_k_const must be > 0, got {}", self.rrf_k_const));
        }
        if self.stage1_candidate_count == 0 {
            return Err("stage1_candidate_count must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.rerank_threshold) {
            return Err(format!(
                "rerank_threshold must be in [0.0, 1.0], got {}",
                self.rerank_threshold
            ));
        }
        if self.rerank_batch_size == 0 {
            return Err("rerank_batch_size must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.relevant_threshold)
            || !(0.0..=1.0).contains(&self.partial_threshold)
        {
            return Err("evaluator thresholds must be in [0.0, 1.0]".to_string());
        }
        if self.partial_threshold >= self.relevant_threshold {
            return Err(format!(
                "partial_threshold ({}) must be below relevant_threshold ({})",
                self.partial_threshold, self.relevant_threshold
            ));
        }
        if self.token_budget == 0 {
            return Err("token_budget must be > 0".to_string());
        }
        if self.max_artifacts == 0 {
            return Err("max_artifacts must be > 0".to_string());
        }
        Ok(())
    }

    /// Preset optimized for low latency: smaller candidate pool, reranking
    /// effectively reserved for long queries, no external fallback.
    pub fn fast() -> Self {
        Self {
            stage1_candidate_count: 30,
            rerank_min_query_words: 8,
            enable_external_fallback: false,
            ..Default::default()
        }
    }

    /// Preset optimized for answer quality: larger candidate pool and a
    /// stricter rerank cutoff.
    pub fn thorough() -> Self {
        Self {
            stage1_candidate_count: 200,
            rerank_threshold: 0.45,
            max_artifacts: 15,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_preset_configs_valid() {
        assert!(EngineConfig::fast().validate().is_ok());
        assert!(EngineConfig::thorough().validate().is_ok());
    }

    #[test]
    fn test_threshold_ordering_enforced() {
        let config = EngineConfig {
            partial_threshold: 0.8,
            relevant_threshold: 0.75,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_counts_rejected() {
        let config = EngineConfig {
            stage1_candidate_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            max_artifacts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserializes_with_partial_fields() {
        let config: EngineConfig = serde_json::from_str(r#"{"token_budget": 2000}"#).unwrap();
        assert_eq!(config.token_budget, 2000);
        assert_eq!(config.rrf_k_const, 60.0);
        assert!(!config.enable_multi_step);
    }
}
