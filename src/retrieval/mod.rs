//! Hybrid retrieval & reranking
//!
//! A query fans out to a semantic and a lexical backend at once, the two ranked
//! lists are merged with Reciprocal Rank Fusion, and the head of the fused list
//! is optionally refined by a cross-encoder. Backend failures degrade the answer
//! instead of failing it; see [`RetrievalEvent`].

mod blocking;
mod candidate;
mod deduplication;
mod fanout;
mod fusion;
mod hybrid;
mod outcome;
mod provenance;
mod reranker;

pub use blocking::BlockingRetriever;
pub use candidate::{Candidate, Metadata, RankedList, Source};
pub use deduplication::{normalize_content, ContentKey, ContentKeyPolicy};
pub use fanout::{FanOutCoordinator, FanOutResult, MIN_SEARCH_MULTIPLIER};
pub use fusion::{reciprocal_rank_fusion, FusionConfig, FusionError, DEFAULT_RRF_K};
pub use hybrid::{HybridRetriever, RetrieverSettings};
pub use outcome::{RetrievalEvent, RetrievalOutcome};
pub use provenance::{
    FusedResult, Provenance, RankedPassage, RerankedResult, RetrievedPassage, ScoreOrigin,
    ScoredPassage,
};
pub use reranker::{RerankStage, RERANK_WINDOW_FACTOR};
