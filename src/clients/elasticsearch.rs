//! Lexical BM25 search over Elasticsearch's REST API

use super::http::{join_url, HttpSettings, JsonHttp};
use super::qdrant::payload_to_passage;
use super::{BackendError, KeywordSearchClient};
use crate::retrieval::{RankedList, Source};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_source", default)]
    source: Option<serde_json::Map<String, Value>>,
}

/// Keyword search client backed by an Elasticsearch index
pub struct ElasticsearchClient {
    http: JsonHttp,
    base_url: String,
    index: String,
    fuzziness: String,
}

impl ElasticsearchClient {
    pub fn new(
        base_url: impl Into<String>,
        index: impl Into<String>,
        settings: &HttpSettings,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            http: JsonHttp::new(settings)?,
            base_url: base_url.into(),
            index: index.into(),
            fuzziness: "AUTO".to_string(),
        })
    }

    /// Set the `fuzziness` of the match query (e.g. "AUTO", "0", "1")
    pub fn with_fuzziness(mut self, fuzziness: impl Into<String>) -> Self {
        self.fuzziness = fuzziness.into();
        self
    }

    fn query_body(&self, query: &str, size: usize) -> Value {
        json!({
            "query": {
                "match": {
                    "content": {
                        "query": query,
                        "fuzziness": self.fuzziness,
                    }
                }
            },
            "size": size,
        })
    }
}

#[async_trait]
impl KeywordSearchClient for ElasticsearchClient {
    async fn search(&self, query: &str, k: usize) -> Result<RankedList, BackendError> {
        if k == 0 {
            return Ok(RankedList::empty(Source::Lexical));
        }

        let url = join_url(&self.base_url, &format!("{}/_search", self.index));
        let response: SearchResponse = self.http.post_json(&url, &self.query_body(query, k)).await?;

        let passages = response
            .hits
            .hits
            .into_iter()
            .filter_map(|hit| hit.source.and_then(payload_to_passage));

        let mut list = RankedList::from_passages(Source::Lexical, passages);
        list.truncate(k);
        Ok(list)
    }

    fn name(&self) -> &str {
        "elasticsearch"
    }
}
