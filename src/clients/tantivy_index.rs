/// Tantivy keyword index adapter for offline lexical search
use super::{BackendError, KeywordSearchClient};
use crate::retrieval::{Metadata, RankedList, Source};
use async_trait::async_trait;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{Index, IndexReader, ReloadPolicy};
use tracing::debug;

/// Stored, tokenized passage text
pub const CONTENT_FIELD: &str = "content";
/// Stored JSON object with passage metadata
pub const METADATA_FIELD: &str = "metadata";

/// Schema expected of indexes opened by [`TantivyKeywordClient`]
pub fn keyword_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field(CONTENT_FIELD, TEXT | STORED);
    schema_builder.add_text_field(METADATA_FIELD, STORED);
    schema_builder.build()
}

/// Cheaply clonable handle moved onto the blocking pool for each search
#[derive(Clone)]
struct IndexHandle {
    index: Index,
    reader: IndexReader,
    content_field: Field,
    metadata_field: Field,
}

/// Read-only BM25 search over an existing on-disk tantivy index
///
/// Index building belongs to the ingestion tooling; this adapter only opens
/// and searches.
pub struct TantivyKeywordClient {
    handle: IndexHandle,
}

impl TantivyKeywordClient {
    /// Open the index stored in `index_path`
    pub fn open(index_path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let index_path = index_path.as_ref().to_path_buf();
        if !index_path.join("meta.json").exists() {
            return Err(BackendError::IndexError(format!(
                "No tantivy index at {}",
                index_path.display()
            )));
        }

        let index = Index::open_in_dir(&index_path)
            .map_err(|e| BackendError::InitializationError(e.to_string()))?;
        let schema = index.schema();

        let content_field = schema.get_field(CONTENT_FIELD).map_err(|_| {
            BackendError::InitializationError("Missing 'content' field in schema".to_string())
        })?;
        let metadata_field = schema.get_field(METADATA_FIELD).map_err(|_| {
            BackendError::InitializationError("Missing 'metadata' field in schema".to_string())
        })?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e: tantivy::TantivyError| {
                BackendError::InitializationError(e.to_string())
            })?;

        let client = Self {
            handle: IndexHandle {
                index,
                reader,
                content_field,
                metadata_field,
            },
        };
        debug!(
            "Opened keyword index at {} ({} passages)",
            index_path.display(),
            client.len()
        );
        Ok(client)
    }

    /// Get the number of passages in the index
    pub fn len(&self) -> u64 {
        self.handle.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IndexHandle {
    /// Blocking search, returns passages in BM25 order
    fn search_blocking(&self, query: &str, limit: usize) -> Result<RankedList, BackendError> {
        let searcher = self.reader.searcher();

        // Lenient parsing: questions carry '?', ':' and quotes that must not fail the search
        let query_parser = QueryParser::for_index(&self.index, vec![self.content_field]);
        let (parsed, errors) = query_parser.parse_query_lenient(query);
        if !errors.is_empty() {
            debug!("Ignored {} query syntax errors", errors.len());
        }

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit))
            .map_err(|e| BackendError::IndexError(e.to_string()))?;

        let mut passages = Vec::with_capacity(top_docs.len());
        for (_score, doc_address) in top_docs {
            let retrieved_doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| BackendError::IndexError(e.to_string()))?;

            let content = match retrieved_doc
                .get_first(self.content_field)
                .and_then(|v| v.as_str())
            {
                Some(text) => text.to_string(),
                None => continue,
            };

            let metadata = retrieved_doc
                .get_first(self.metadata_field)
                .and_then(|v| v.as_str())
                .and_then(|raw| serde_json::from_str::<Metadata>(raw).ok())
                .unwrap_or_default();

            passages.push((content, metadata));
        }

        Ok(RankedList::from_passages(Source::Lexical, passages))
    }
}

#[async_trait]
impl KeywordSearchClient for TantivyKeywordClient {
    async fn search(&self, query: &str, k: usize) -> Result<RankedList, BackendError> {
        if k == 0 {
            return Ok(RankedList::empty(Source::Lexical));
        }

        // Off the executor so the fan-out timeout can abandon a slow search
        let handle = self.handle.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || handle.search_blocking(&query, k))
            .await
            .map_err(|e| BackendError::IndexError(format!("Search task failed: {}", e)))?
    }

    fn name(&self) -> &str {
        "tantivy"
    }
}
