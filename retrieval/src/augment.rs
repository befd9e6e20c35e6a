use async_trait::async_trait;
use log::{debug, warn};
use sift_chunk::{Chunk, ChunkPosition, EXTERNAL_LANGUAGE};
use std::sync::Arc;
use std::time::Duration;

/// One result from an external search provider.
#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub title: String,

    /// URL or provider-native identifier.
    pub origin: String,

    pub content: String,

    /// Provider-native relevance score.
    pub score: f32,
}

/// External search provider boundary. The provider's internals (transport,
/// auth, rate limiting) live outside this crate.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<ProviderResult>>;
}

/// Last-resort retrieval from an external source.
///
/// Converts provider results into the same chunk shape used internally, with
/// a synthetic source path and the external language sentinel. Every failure
/// mode (timeout, provider error, empty response) collapses to an empty list;
/// the engine treats that as "no correction available" rather than failing
/// the request.
pub struct ExternalAugmenter {
    provider: Arc<dyn SearchProvider>,
    timeout: Duration,
}

impl ExternalAugmenter {
    pub fn new(provider: Arc<dyn SearchProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Fetch external results for `query` as chunks paired with the
    /// provider's score, clamped to [0, 1].
    pub async fn augment(&self, query: &str) -> Vec<(Chunk, f32)> {
        let results = match tokio::time::timeout(self.timeout, self.provider.search(query)).await {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                warn!("External provider failed: {e}");
                return Vec::new();
            }
            Err(_) => {
                warn!("External provider timed out after {:?}", self.timeout);
                return Vec::new();
            }
        };

        debug!("External provider returned {} results", results.len());
        results
            .into_iter()
            .enumerate()
            .map(|(i, result)| {
                let content = if result.title.is_empty() {
                    result.content
                } else {
                    format!("{}\n{}", result.title, result.content)
                };
                let end = content.len();
                let chunk = Chunk::new(format!("external-{i}"), result.origin, content)
                    .with_language(EXTERNAL_LANGUAGE)
                    .with_position(ChunkPosition::new(i, 0, end));
                (chunk, result.score.clamp(0.0, 1.0))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct StaticProvider {
        results: Vec<ProviderResult>,
    }

    #[async_trait]
    impl SearchProvider for StaticProvider {
        async fn search(&self, _query: &str) -> anyhow::Result<Vec<ProviderResult>> {
            Ok(self.results.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl SearchProvider for FailingProvider {
        async fn search(&self, _query: &str) -> anyhow::Result<Vec<ProviderResult>> {
            anyhow::bail!("upstream 503")
        }
    }

    struct HangingProvider;

    #[async_trait]
    impl SearchProvider for HangingProvider {
        async fn search(&self, _query: &str) -> anyhow::Result<Vec<ProviderResult>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_results_become_external_chunks() {
        let provider = Arc::new(StaticProvider {
            results: vec![ProviderResult {
                title: "Result title".to_string(),
                origin: "https://example.com/a".to_string(),
                content: "body text".to_string(),
                score: 1.7,
            }],
        });
        let augmenter = ExternalAugmenter::new(provider, Duration::from_secs(5));

        let chunks = augmenter.augment("anything").await;
        assert_eq!(chunks.len(), 1);

        let (chunk, score) = &chunks[0];
        assert!(chunk.is_external());
        assert_eq!(chunk.source_path, "https://example.com/a");
        assert!(chunk.content.contains("Result title"));
        assert!(chunk.content.contains("body text"));
        assert_eq!(*score, 1.0);
    }

    #[tokio::test]
    async fn test_provider_failure_returns_empty() {
        let augmenter =
            ExternalAugmenter::new(Arc::new(FailingProvider), Duration::from_secs(5));
        assert!(augmenter.augment("anything").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_timeout_returns_empty() {
        let augmenter =
            ExternalAugmenter::new(Arc::new(HangingProvider), Duration::from_millis(50));
        assert!(augmenter.augment("anything").await.is_empty());
    }
}
