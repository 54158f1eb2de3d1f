//! Synchronous facade over [`HybridRetriever`] for the CLI

use crate::config::Config;
use crate::error::{LawragError, Result};
use crate::retrieval::{HybridRetriever, RetrievalOutcome, RetrievedPassage, ScoredPassage};
use tokio::runtime::{Builder, Runtime};

/// Owns a runtime and blocks on each retrieval
///
/// Only for callers with no runtime of their own; async code should use
/// [`HybridRetriever`] directly.
pub struct BlockingRetriever {
    runtime: Runtime,
    retriever: HybridRetriever,
}

impl BlockingRetriever {
    /// Build the runtime, then every backend named in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("lawrag-worker")
            .build()
            .map_err(|e| LawragError::Io {
                source: e,
                context: "Failed to start async runtime".to_string(),
            })?;

        let retriever = {
            let _guard = runtime.enter();
            HybridRetriever::from_config(config)?
        };

        Ok(Self { runtime, retriever })
    }

    /// Wrap an already built retriever; it must not depend on another runtime
    pub fn new(runtime: Runtime, retriever: HybridRetriever) -> Self {
        Self { runtime, retriever }
    }

    pub fn assemble(&self, query: &str, k: usize, use_rerank: bool) -> RetrievalOutcome {
        self.runtime
            .block_on(self.retriever.assemble(query, k, use_rerank))
    }

    pub fn retrieve(&self, query: &str, k: usize, use_rerank: bool) -> Vec<RetrievedPassage> {
        self.runtime
            .block_on(self.retriever.retrieve(query, k, use_rerank))
    }

    pub fn retrieve_with_scores(&self, query: &str, k: usize, use_rerank: bool) -> Vec<ScoredPassage> {
        self.runtime
            .block_on(self.retriever.retrieve_with_scores(query, k, use_rerank))
    }

    pub fn retrieve_as_json(&self, query: &str, k: usize, use_rerank: bool) -> Result<String> {
        self.runtime
            .block_on(self.retriever.retrieve_as_json(query, k, use_rerank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{BackendError, KeywordSearchClient, VectorSearchClient};
    use crate::retrieval::{RankedList, RetrieverSettings, Source};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Unreachable;

    #[async_trait]
    impl VectorSearchClient for Unreachable {
        async fn search(&self, _q: &str, _k: usize) -> std::result::Result<RankedList, BackendError> {
            Err(BackendError::RequestError("connection refused".to_string()))
        }

        fn name(&self) -> &str {
            "unreachable"
        }
    }

    struct OneDoc;

    #[async_trait]
    impl KeywordSearchClient for OneDoc {
        async fn search(&self, _q: &str, _k: usize) -> std::result::Result<RankedList, BackendError> {
            Ok(RankedList::from_texts(Source::Lexical, ["Điều 5"]))
        }

        fn name(&self) -> &str {
            "one"
        }
    }

    #[test]
    fn test_blocking_retrieve() {
        let runtime = Builder::new_current_thread().enable_all().build().unwrap();
        let retriever = HybridRetriever::new(
            Arc::new(Unreachable),
            Arc::new(OneDoc),
            None,
            RetrieverSettings::default(),
        );
        let blocking = BlockingRetriever::new(runtime, retriever);

        let outcome = blocking.assemble("mũ bảo hiểm", 3, false);
        assert_eq!(outcome.passages.len(), 1);
        assert!(outcome.source_unavailable(Source::Semantic));

        let passages = blocking.retrieve("mũ bảo hiểm", 3, false);
        assert_eq!(passages[0].content, "Điều 5");
    }
}
