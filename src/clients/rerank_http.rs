//! Remote cross-encoder rerank API client

use super::http::{HttpSettings, JsonHttp};
use super::{BackendError, RerankClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankItem>,
}

#[derive(Deserialize)]
struct RerankItem {
    #[serde(alias = "document_index")]
    index: usize,
    #[serde(alias = "score")]
    relevance_score: f32,
}

/// Client for rerank services speaking the `{query, documents, top_n}` protocol
pub struct HttpRerankClient {
    http: JsonHttp,
    url: String,
}

impl HttpRerankClient {
    pub fn new(url: impl Into<String>, settings: &HttpSettings) -> Result<Self, BackendError> {
        Ok(Self {
            http: JsonHttp::new(settings)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RerankClient for HttpRerankClient {
    async fn rerank(
        &self,
        query: &str,
        texts: &[String],
        top_n: usize,
    ) -> Result<Vec<(usize, f32)>, BackendError> {
        if texts.is_empty() {
            return Err(BackendError::InvalidInput(
                "No documents to rerank".to_string(),
            ));
        }

        let request = RerankRequest {
            query,
            documents: texts,
            top_n,
        };
        let response: RerankResponse = self.http.post_json(&self.url, &request).await?;

        Ok(response
            .results
            .into_iter()
            .map(|item| (item.index, item.relevance_score))
            .collect())
    }

    fn name(&self) -> &str {
        "http-rerank"
    }
}
