//! Concurrent fan-out to the semantic and lexical search backends

use crate::clients::{BackendError, KeywordSearchClient, VectorSearchClient};
use crate::retrieval::{RankedList, RetrievalEvent, Source};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Smallest allowed over-fetch factor
pub const MIN_SEARCH_MULTIPLIER: usize = 2;

/// Both ranked lists for one query, plus the sources lost on the way
#[derive(Debug, Clone)]
pub struct FanOutResult {
    pub semantic: RankedList,
    pub lexical: RankedList,
    pub events: Vec<RetrievalEvent>,
}

/// Queries both search backends at once and tolerates either failing
pub struct FanOutCoordinator {
    semantic: Arc<dyn VectorSearchClient>,
    lexical: Arc<dyn KeywordSearchClient>,
    multiplier: usize,
    source_timeout: Duration,
}

impl FanOutCoordinator {
    /// # Arguments
    /// * `multiplier` - Each backend is asked for `k * multiplier` passages (at least 2x)
    /// * `source_timeout` - Budget of each backend call
    pub fn new(
        semantic: Arc<dyn VectorSearchClient>,
        lexical: Arc<dyn KeywordSearchClient>,
        multiplier: usize,
        source_timeout: Duration,
    ) -> Self {
        Self {
            semantic,
            lexical,
            multiplier: multiplier.max(MIN_SEARCH_MULTIPLIER),
            source_timeout,
        }
    }

    /// Fetch ranked lists from both sources
    ///
    /// A source that errors, times out or runs past `deadline` yields an empty
    /// list and a `SourceUnavailable` event. Never fails, never retries.
    pub async fn fetch(&self, query: &str, k: usize, deadline: Option<Instant>) -> FanOutResult {
        let limit = k.saturating_mul(self.multiplier);
        let timeout = remaining_budget(self.source_timeout, deadline);
        debug!("Fanning out for {} passages per source (timeout {:?})", limit, timeout);

        let (semantic, lexical) = tokio::join!(
            bounded(timeout, self.semantic.search(query, limit)),
            bounded(timeout, self.lexical.search(query, limit)),
        );

        let mut events = Vec::new();
        let semantic = settle(Source::Semantic, self.semantic.name(), semantic, limit, &mut events);
        let lexical = settle(Source::Lexical, self.lexical.name(), lexical, limit, &mut events);

        if semantic.is_empty() && lexical.is_empty() && events.len() == 2 {
            warn!("All search sources unavailable");
            events.push(RetrievalEvent::AllSourcesUnavailable);
        }

        FanOutResult {
            semantic,
            lexical,
            events,
        }
    }
}

/// Time left for one call: the per-call limit, capped by the query deadline
pub(crate) fn remaining_budget(limit: Duration, deadline: Option<Instant>) -> Duration {
    match deadline {
        Some(deadline) => limit.min(deadline.saturating_duration_since(Instant::now())),
        None => limit,
    }
}

async fn bounded<F>(timeout: Duration, call: F) -> Result<RankedList, String>
where
    F: Future<Output = Result<RankedList, BackendError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(list)) => Ok(list),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {:?}", timeout)),
    }
}

fn settle(
    source: Source,
    backend: &str,
    result: Result<RankedList, String>,
    limit: usize,
    events: &mut Vec<RetrievalEvent>,
) -> RankedList {
    match result {
        Ok(mut list) => {
            list.truncate(limit);
            debug!("{} ({}) returned {} passages", source, backend, list.len());
            list
        }
        Err(reason) => {
            warn!("{} source ({}) unavailable: {}", source, backend, reason);
            events.push(RetrievalEvent::SourceUnavailable {
                kind: source,
                reason,
            });
            RankedList::empty(source)
        }
    }
}
