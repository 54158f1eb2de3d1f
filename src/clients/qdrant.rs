//! Semantic search over Qdrant's REST API
//!
//! The query is embedded by the external embedding service first; this client
//! never computes vectors itself.

use super::http::{join_url, HttpSettings, JsonHttp};
use super::{BackendError, VectorSearchClient};
use crate::retrieval::{Metadata, RankedList, Source};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct PointSearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct PointSearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    #[serde(default)]
    payload: Option<serde_json::Map<String, Value>>,
}

/// Vector search client backed by a Qdrant collection
pub struct QdrantSearchClient {
    /// Carries the embedding API key
    embedding_http: JsonHttp,
    qdrant_http: JsonHttp,
    qdrant_url: String,
    collection: String,
    embedding_api_url: String,
}

impl QdrantSearchClient {
    pub fn new(
        qdrant_url: impl Into<String>,
        collection: impl Into<String>,
        embedding_api_url: impl Into<String>,
        settings: &HttpSettings,
    ) -> Result<Self, BackendError> {
        let qdrant_settings = settings.clone().with_api_key(None);
        Ok(Self {
            embedding_http: JsonHttp::new(settings)?,
            qdrant_http: JsonHttp::new(&qdrant_settings)?,
            qdrant_url: qdrant_url.into(),
            collection: collection.into(),
            embedding_api_url: embedding_api_url.into(),
        })
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, BackendError> {
        let response: EmbeddingResponse = self
            .embedding_http
            .post_json(&self.embedding_api_url, &EmbeddingRequest { input: query })
            .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                BackendError::MalformedResponse("Embedding API returned no vector".to_string())
            })
    }
}

#[async_trait]
impl VectorSearchClient for QdrantSearchClient {
    async fn search(&self, query: &str, k: usize) -> Result<RankedList, BackendError> {
        if k == 0 {
            return Ok(RankedList::empty(Source::Semantic));
        }

        let vector = self.embed_query(query).await?;

        let url = join_url(
            &self.qdrant_url,
            &format!("collections/{}/points/search", self.collection),
        );
        let request = PointSearchRequest {
            vector: &vector,
            limit: k,
            with_payload: true,
        };
        let response: PointSearchResponse = self.qdrant_http.post_json(&url, &request).await?;

        let passages = response
            .result
            .into_iter()
            .filter_map(|point| point.payload.and_then(payload_to_passage));

        let mut list = RankedList::from_passages(Source::Semantic, passages);
        list.truncate(k);
        Ok(list)
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

/// Split a stored payload into passage text and metadata
///
/// Points without a string `content` are skipped. A nested `metadata` object is
/// flattened into the top level; explicit top-level keys win.
pub(crate) fn payload_to_passage(mut payload: Metadata) -> Option<(String, Metadata)> {
    let content = match payload.remove("content") {
        Some(Value::String(text)) => text,
        _ => return None,
    };

    let mut metadata = Metadata::new();
    if let Some(Value::Object(nested)) = payload.remove("metadata") {
        metadata.extend(nested);
    }
    // Backend scores are rank-only noise past this point
    payload.remove("score");
    metadata.extend(payload);

    Some((content, metadata))
}
