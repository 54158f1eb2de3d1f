//! Search and rerank backend adapters
//!
//! The pipeline only sees the three traits below. Each adapter maps its
//! backend's payload into the fixed [`Candidate`](crate::retrieval::Candidate)
//! record, so backend-specific shapes never reach fusion or reranking.
//! Implementations are long-lived and shared by concurrent queries.

mod elasticsearch;
mod fastembed_rerank;
mod http;
mod qdrant;
mod rerank_http;
mod tantivy_index;

pub use elasticsearch::ElasticsearchClient;
pub use fastembed_rerank::{CrossEncoder, FastEmbedCrossEncoder, RerankWorkerPool};
pub use http::HttpSettings;
pub use qdrant::QdrantSearchClient;
pub use rerank_http::HttpRerankClient;
pub use tantivy_index::{keyword_schema, TantivyKeywordClient, CONTENT_FIELD, METADATA_FIELD};

use crate::config::{resolve_api_key, KeywordBackend, KeywordConfig, RerankBackend, RerankConfig, VectorConfig};
use crate::retrieval::RankedList;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Client initialization failed: {0}")]
    InitializationError(String),

    #[error("Request failed: {0}")]
    RequestError(String),

    #[error("Backend returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Inference failed: {0}")]
    InferenceError(String),

    #[error("Worker pool unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::MalformedResponse(e.to_string())
        } else {
            BackendError::RequestError(e.to_string())
        }
    }
}

/// Semantic (vector) search backend
#[async_trait]
pub trait VectorSearchClient: Send + Sync {
    /// Return up to `k` passages ordered by semantic similarity
    async fn search(&self, query: &str, k: usize) -> Result<RankedList, BackendError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Lexical (keyword / BM25) search backend
#[async_trait]
pub trait KeywordSearchClient: Send + Sync {
    /// Return up to `k` passages ordered by lexical relevance
    async fn search(&self, query: &str, k: usize) -> Result<RankedList, BackendError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Cross-encoder relevance scoring backend
#[async_trait]
pub trait RerankClient: Send + Sync {
    /// Score `(query, texts[i])` pairs
    ///
    /// Returns `(index into texts, score)` pairs. Implementations may return only
    /// the best `top_n`, but no fewer than `min(top_n, texts.len())`; ordering
    /// of the returned pairs is not relied upon.
    async fn rerank(
        &self,
        query: &str,
        texts: &[String],
        top_n: usize,
    ) -> Result<Vec<(usize, f32)>, BackendError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Build the configured semantic search client
pub fn vector_client_from_config(
    config: &VectorConfig,
    timeout: Duration,
) -> Result<Arc<dyn VectorSearchClient>, BackendError> {
    let settings = HttpSettings::new(timeout).with_api_key(resolve_api_key(&config.api_key_env));
    let client = QdrantSearchClient::new(
        &config.qdrant_url,
        &config.collection,
        &config.embedding_api_url,
        &settings,
    )?;
    Ok(Arc::new(client))
}

/// Build the configured lexical search client
pub fn keyword_client_from_config(
    config: &KeywordConfig,
    timeout: Duration,
) -> Result<Arc<dyn KeywordSearchClient>, BackendError> {
    match config.backend {
        KeywordBackend::Elasticsearch => {
            let client =
                ElasticsearchClient::new(&config.elasticsearch_url, &config.index, &HttpSettings::new(timeout))?
                    .with_fuzziness(&config.fuzziness);
            Ok(Arc::new(client))
        }
        KeywordBackend::Tantivy => Ok(Arc::new(TantivyKeywordClient::open(&config.tantivy_path)?)),
    }
}

/// Build the configured reranker
///
/// The fastembed backend loads the model and starts its worker pool, so it
/// must be called inside a tokio runtime.
pub fn rerank_client_from_config(config: &RerankConfig) -> Result<Arc<dyn RerankClient>, BackendError> {
    match config.backend {
        RerankBackend::Http => {
            let settings = HttpSettings::new(config.timeout())
                .with_api_key(resolve_api_key(&config.api_key_env));
            Ok(Arc::new(HttpRerankClient::new(&config.api_url, &settings)?))
        }
        RerankBackend::Fastembed => {
            let encoder = Arc::new(FastEmbedCrossEncoder::new(&config.model)?);
            Ok(Arc::new(RerankWorkerPool::new(
                encoder,
                config.workers,
                config.queue_capacity,
            )))
        }
    }
}
