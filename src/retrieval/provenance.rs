//! Fused, reranked and final passage records

use crate::retrieval::{Metadata, Source};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A deduplicated passage with its reciprocal rank fusion score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub content: String,

    /// Metadata of the first source that contributed this passage
    pub metadata: Metadata,

    /// Sum of `1 / (k + rank)` over the sources containing this passage
    pub rrf_score: f64,

    pub contributing_sources: BTreeSet<Source>,
}

/// How a final score was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Scored by the cross-encoder
    Reranked,
    /// Reranking failed; fusion order and score were kept
    FusionFallback,
}

/// A passage after the rerank stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedResult {
    pub content: String,
    pub metadata: Metadata,

    /// Cross-encoder relevance, or the fusion score under `FusionFallback`
    pub rerank_score: f64,

    pub provenance: Provenance,
}

impl RerankedResult {
    /// Carry a fused passage through unchanged after a rerank failure
    pub fn fallback(fused: FusedResult) -> Self {
        Self {
            content: fused.content,
            metadata: fused.metadata,
            rerank_score: fused.rrf_score,
            provenance: Provenance::FusionFallback,
        }
    }

    pub fn is_reranked(&self) -> bool {
        self.provenance == Provenance::Reranked
    }
}

/// Final output of the assembler: reranked when requested, fused otherwise
#[derive(Debug, Clone, PartialEq)]
pub enum RankedPassage {
    Reranked(RerankedResult),
    Fused(FusedResult),
}

impl RankedPassage {
    pub fn content(&self) -> &str {
        match self {
            RankedPassage::Reranked(r) => &r.content,
            RankedPassage::Fused(f) => &f.content,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            RankedPassage::Reranked(r) => &r.metadata,
            RankedPassage::Fused(f) => &f.metadata,
        }
    }

    /// Rerank score when reranked, fusion score otherwise
    pub fn score(&self) -> f64 {
        match self {
            RankedPassage::Reranked(r) => r.rerank_score,
            RankedPassage::Fused(f) => f.rrf_score,
        }
    }

    /// True only for passages actually scored by the cross-encoder
    pub fn is_reranked(&self) -> bool {
        matches!(self, RankedPassage::Reranked(r) if r.is_reranked())
    }

    /// Get a short preview of the content (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        let content = self.content();
        if content.chars().count() <= max_chars {
            content.to_string()
        } else {
            let head: String = content.chars().take(max_chars).collect();
            format!("{}...", head)
        }
    }
}

/// Where the score of a retrieved passage came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreOrigin {
    Fusion,
    Rerank,
    FusionFallback,
}

/// Candidate-with-score handed to the generation stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub content: String,
    pub metadata: Metadata,
    pub score: f64,
    pub origin: ScoreOrigin,
}

impl From<RankedPassage> for RetrievedPassage {
    fn from(passage: RankedPassage) -> Self {
        match passage {
            RankedPassage::Reranked(r) => {
                let origin = match r.provenance {
                    Provenance::Reranked => ScoreOrigin::Rerank,
                    Provenance::FusionFallback => ScoreOrigin::FusionFallback,
                };
                Self {
                    content: r.content,
                    metadata: r.metadata,
                    score: r.rerank_score,
                    origin,
                }
            }
            RankedPassage::Fused(f) => Self {
                content: f.content,
                metadata: f.metadata,
                score: f.rrf_score,
                origin: ScoreOrigin::Fusion,
            },
        }
    }
}

/// Flat record for evaluation and observability output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub content: String,
    pub metadata: Metadata,
    pub score: f64,
    pub reranked: bool,
}

impl From<RankedPassage> for ScoredPassage {
    fn from(passage: RankedPassage) -> Self {
        let reranked = passage.is_reranked();
        let score = passage.score();
        let (content, metadata) = match passage {
            RankedPassage::Reranked(r) => (r.content, r.metadata),
            RankedPassage::Fused(f) => (f.content, f.metadata),
        };

        Self {
            content,
            metadata,
            score,
            reranked,
        }
    }
}
