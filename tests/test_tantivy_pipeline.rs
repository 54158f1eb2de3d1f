//! Integration test: on-disk tantivy index as the lexical source of the pipeline

use async_trait::async_trait;
use lawrag::clients::{
    keyword_schema, BackendError, TantivyKeywordClient, VectorSearchClient, CONTENT_FIELD,
    METADATA_FIELD,
};
use lawrag::retrieval::{HybridRetriever, RankedList, RetrieverSettings, Source};
use std::path::Path;
use std::sync::Arc;
use tantivy::{doc, Index, IndexWriter};
use tempfile::TempDir;

struct VectorDown;

#[async_trait]
impl VectorSearchClient for VectorDown {
    async fn search(&self, _query: &str, _k: usize) -> Result<RankedList, BackendError> {
        Err(BackendError::HttpStatus {
            status: 502,
            message: "bad gateway".to_string(),
        })
    }

    fn name(&self) -> &str {
        "down"
    }
}

fn build_index(path: &Path) {
    let index = Index::create_in_dir(path, keyword_schema()).unwrap();
    let schema = index.schema();
    let content = schema.get_field(CONTENT_FIELD).unwrap();
    let metadata = schema.get_field(METADATA_FIELD).unwrap();

    let passages = [
        (
            "Phạt tiền từ 18.000.000 đồng đến 20.000.000 đồng đối với người điều khiển xe vượt đèn đỏ",
            r#"{"article": "Điều 6", "law": "Nghị định 100/2019"}"#,
        ),
        (
            "Người điều khiển xe mô tô không đội mũ bảo hiểm",
            r#"{"article": "Điều 7"}"#,
        ),
        (
            "Dừng xe, đỗ xe trên đường cao tốc không đúng nơi quy định",
            r#"{"article": "Điều 5"}"#,
        ),
    ];

    let mut writer: IndexWriter = index.writer_with_num_threads(1, 50_000_000).unwrap();
    for (text, meta) in passages {
        writer
            .add_document(doc!(content => text, metadata => meta))
            .unwrap();
    }
    writer.commit().unwrap();
}

#[tokio::test]
async fn test_keyword_only_retrieval_with_tantivy() {
    let temp = TempDir::new().unwrap();
    build_index(temp.path());

    let lexical = TantivyKeywordClient::open(temp.path()).unwrap();
    let retriever = HybridRetriever::new(
        Arc::new(VectorDown),
        Arc::new(lexical),
        None,
        RetrieverSettings::default(),
    );

    let outcome = retriever.assemble("vượt đèn đỏ phạt bao nhiêu?", 2, false).await;

    assert!(outcome.source_unavailable(Source::Semantic));
    assert!(!outcome.passages.is_empty());
    assert_eq!(outcome.passages[0].metadata()["article"], "Điều 6");
    assert!(outcome.passages[0].content().contains("vượt đèn đỏ"));
    assert!(outcome.passages.len() <= 2);
}
