//! Hybrid retrieval: fan-out, fusion, reranking and result assembly

use crate::clients::{self, KeywordSearchClient, RerankClient, VectorSearchClient};
use crate::config::{Config, RetrievalConfig};
use crate::error::{LawragError, Result};
use crate::retrieval::{
    reciprocal_rank_fusion, FanOutCoordinator, FusionConfig, RankedPassage, RerankStage,
    RerankedResult, RetrievalEvent, RetrievalOutcome, RetrievedPassage, ScoredPassage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Orchestration parameters of a [`HybridRetriever`]
#[derive(Debug, Clone)]
pub struct RetrieverSettings {
    pub fusion: FusionConfig,
    pub search_multiplier: usize,
    pub source_timeout: Duration,
    pub rerank_timeout: Duration,
    /// Overall budget of one query; `None` leaves only the per-call timeouts
    pub query_deadline: Option<Duration>,
}

impl RetrieverSettings {
    pub fn from_config(retrieval: &RetrievalConfig, rerank_timeout: Duration) -> Result<Self> {
        let fusion = FusionConfig::new(retrieval.rrf_k, retrieval.content_key).map_err(|e| {
            LawragError::InvalidConfigValue {
                path: "retrieval.rrf_k".to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            fusion,
            search_multiplier: retrieval.search_multiplier,
            source_timeout: retrieval.source_timeout(),
            rerank_timeout,
            query_deadline: Some(retrieval.query_deadline()),
        })
    }
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        let retrieval = RetrievalConfig::default();
        Self {
            fusion: FusionConfig::default(),
            search_multiplier: retrieval.search_multiplier,
            source_timeout: retrieval.source_timeout(),
            rerank_timeout: Duration::from_secs(30),
            query_deadline: Some(retrieval.query_deadline()),
        }
    }
}

/// Hybrid retriever combining semantic and keyword search
///
/// Stateless between calls; one instance serves concurrent queries.
pub struct HybridRetriever {
    fanout: FanOutCoordinator,
    reranker: Option<RerankStage>,
    fusion: FusionConfig,
    query_deadline: Option<Duration>,
}

impl HybridRetriever {
    /// Create a retriever over injected backends
    ///
    /// Without a `reranker`, rerank requests degrade to fusion order.
    pub fn new(
        semantic: Arc<dyn VectorSearchClient>,
        lexical: Arc<dyn KeywordSearchClient>,
        reranker: Option<Arc<dyn RerankClient>>,
        settings: RetrieverSettings,
    ) -> Self {
        let fanout = FanOutCoordinator::new(
            semantic,
            lexical,
            settings.search_multiplier,
            settings.source_timeout,
        );
        let reranker = reranker.map(|client| RerankStage::new(client, settings.rerank_timeout));

        Self {
            fanout,
            reranker,
            fusion: settings.fusion,
            query_deadline: settings.query_deadline,
        }
    }

    /// Build every backend named in the configuration
    ///
    /// Must run inside a tokio runtime when the in-process reranker is selected.
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = RetrieverSettings::from_config(&config.retrieval, config.rerank.timeout())?;
        let semantic = clients::vector_client_from_config(&config.vector, settings.source_timeout)?;
        let lexical = clients::keyword_client_from_config(&config.keyword, settings.source_timeout)?;
        let reranker = if config.retrieval.use_rerank {
            Some(clients::rerank_client_from_config(&config.rerank)?)
        } else {
            None
        };

        info!(
            "Retriever ready: semantic={}, lexical={}, reranker={}",
            semantic.name(),
            lexical.name(),
            reranker.as_ref().map(|r| r.name()).unwrap_or("none")
        );

        Ok(Self::new(semantic, lexical, reranker, settings))
    }

    /// Run the full pipeline for one query
    ///
    /// Returns at most `k` passages, best first, plus every degradation seen.
    /// An empty query or `k == 0` returns nothing without touching a backend.
    pub async fn assemble(&self, query: &str, k: usize, use_rerank: bool) -> RetrievalOutcome {
        let query_id = Uuid::new_v4();
        let span = info_span!("retrieve", %query_id);
        self.assemble_inner(query_id, query, k, use_rerank)
            .instrument(span)
            .await
    }

    async fn assemble_inner(
        &self,
        query_id: Uuid,
        query: &str,
        k: usize,
        use_rerank: bool,
    ) -> RetrievalOutcome {
        let mut outcome = RetrievalOutcome::empty(query_id);
        if query.trim().is_empty() || k == 0 {
            debug!("Empty query or k = 0, nothing to retrieve");
            return outcome;
        }

        let started = Instant::now();
        let deadline = self.query_deadline.map(|budget| started + budget);

        // Step 1: Parallel semantic + keyword search
        let fetched = self.fanout.fetch(query, k, deadline).await;
        outcome.events.extend(fetched.events);

        // Step 2: Reciprocal Rank Fusion, semantic first
        let lists = [fetched.semantic, fetched.lexical];
        let mut fused = reciprocal_rank_fusion(&lists, &self.fusion);
        debug!(
            "Fused {} + {} candidates into {}",
            lists[0].len(),
            lists[1].len(),
            fused.len()
        );

        if fused.is_empty() {
            debug!("No candidates from any source");
            outcome.events.push(RetrievalEvent::EmptyCandidateSet);
            outcome.elapsed = started.elapsed();
            return outcome;
        }

        // Step 3: Rerank the head of the fused list, or just truncate
        outcome.passages = if use_rerank {
            match &self.reranker {
                Some(stage) => {
                    let (results, event) = stage.rerank(query, fused, k, deadline).await;
                    outcome.events.extend(event);
                    results.into_iter().map(RankedPassage::Reranked).collect()
                }
                None => {
                    warn!("Reranking requested but no reranker configured, keeping fusion order");
                    outcome.events.push(RetrievalEvent::RerankFailure(
                        "no reranker configured".to_string(),
                    ));
                    fused
                        .into_iter()
                        .take(k)
                        .map(|f| RankedPassage::Reranked(RerankedResult::fallback(f)))
                        .collect()
                }
            }
        } else {
            fused.truncate(k);
            fused.into_iter().map(RankedPassage::Fused).collect()
        };

        outcome.elapsed = started.elapsed();
        info!(
            "Retrieved {} passages in {:?} ({} degradations)",
            outcome.passages.len(),
            outcome.elapsed,
            outcome.events.len()
        );

        outcome
    }

    /// Passages with their score and its origin
    pub async fn retrieve(&self, query: &str, k: usize, use_rerank: bool) -> Vec<RetrievedPassage> {
        self.assemble(query, k, use_rerank)
            .await
            .passages
            .into_iter()
            .map(RetrievedPassage::from)
            .collect()
    }

    /// Flat `{content, metadata, score, reranked}` records
    pub async fn retrieve_with_scores(
        &self,
        query: &str,
        k: usize,
        use_rerank: bool,
    ) -> Vec<ScoredPassage> {
        self.assemble(query, k, use_rerank)
            .await
            .passages
            .into_iter()
            .map(ScoredPassage::from)
            .collect()
    }

    /// [`retrieve_with_scores`](Self::retrieve_with_scores) as pretty JSON
    pub async fn retrieve_as_json(&self, query: &str, k: usize, use_rerank: bool) -> Result<String> {
        let scored = self.retrieve_with_scores(query, k, use_rerank).await;
        serde_json::to_string_pretty(&scored).map_err(|e| LawragError::Json {
            source: e,
            context: "Failed to serialize retrieval results".to_string(),
        })
    }
}
