//! Degradation events and the per-query retrieval outcome

use crate::retrieval::{RankedPassage, Source};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// A tolerated failure observed while answering one query
///
/// None of these abort retrieval; they are logged and recorded on the
/// [`RetrievalOutcome`] so callers can tell a degraded answer from a clean one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalEvent {
    #[error("{kind} source unavailable: {reason}")]
    SourceUnavailable { kind: Source, reason: String },

    #[error("All search sources unavailable")]
    AllSourcesUnavailable,

    #[error("Reranking failed, kept fusion order: {0}")]
    RerankFailure(String),

    #[error("No candidates to rank")]
    EmptyCandidateSet,
}

/// Everything the assembler produced for one query
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub query_id: Uuid,

    /// Final passages, best first, at most `k`
    pub passages: Vec<RankedPassage>,

    /// Degradations in the order they happened
    pub events: Vec<RetrievalEvent>,

    pub elapsed: Duration,
}

impl RetrievalOutcome {
    pub(crate) fn empty(query_id: Uuid) -> Self {
        Self {
            query_id,
            passages: Vec::new(),
            events: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// True if any stage fell back or lost a source
    pub fn is_degraded(&self) -> bool {
        self.events
            .iter()
            .any(|e| !matches!(e, RetrievalEvent::EmptyCandidateSet))
    }

    pub fn source_unavailable(&self, source: Source) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, RetrievalEvent::SourceUnavailable { kind, .. } if *kind == source))
    }

    pub fn rerank_failed(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, RetrievalEvent::RerankFailure(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_messages() {
        let event = RetrievalEvent::SourceUnavailable {
            kind: Source::Lexical,
            reason: "timed out after 5s".to_string(),
        };
        assert_eq!(
            event.to_string(),
            "lexical source unavailable: timed out after 5s"
        );
    }

    #[test]
    fn test_degraded_flags() {
        let mut outcome = RetrievalOutcome::empty(Uuid::new_v4());
        outcome.events.push(RetrievalEvent::EmptyCandidateSet);
        assert!(!outcome.is_degraded());

        outcome.events.push(RetrievalEvent::SourceUnavailable {
            kind: Source::Semantic,
            reason: "connection refused".to_string(),
        });
        assert!(outcome.is_degraded());
        assert!(outcome.source_unavailable(Source::Semantic));
        assert!(!outcome.source_unavailable(Source::Lexical));
        assert!(!outcome.rerank_failed());
    }
}
