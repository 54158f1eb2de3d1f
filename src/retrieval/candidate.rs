//! Candidates and ranked lists produced by the search adapters

use serde::{Deserialize, Serialize};
use std::fmt;

/// Passage metadata carried through the pipeline untouched
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Which search backend produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Semantic,
    Lexical,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Semantic => write!(f, "semantic"),
            Source::Lexical => write!(f, "lexical"),
        }
    }
}

/// One retrieved passage as returned by a single backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Passage text, also the deduplication key
    pub content: String,

    /// Backend payload fields other than the content
    pub metadata: Metadata,

    /// Backend that returned this passage
    pub source: Source,

    /// 1-based position in the backend's list
    pub source_rank: usize,
}

/// Ordered candidates from one backend for one query
///
/// Only the order matters downstream; backend scores are dropped by the adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedList {
    source: Source,
    candidates: Vec<Candidate>,
}

impl RankedList {
    /// Empty list, used when a source fails
    pub fn empty(source: Source) -> Self {
        Self {
            source,
            candidates: Vec::new(),
        }
    }

    /// Build a list from passages already in backend order, assigning 1-based ranks
    pub fn from_passages<I>(source: Source, passages: I) -> Self
    where
        I: IntoIterator<Item = (String, Metadata)>,
    {
        let candidates = passages
            .into_iter()
            .enumerate()
            .map(|(i, (content, metadata))| Candidate {
                content,
                metadata,
                source,
                source_rank: i + 1,
            })
            .collect();

        Self { source, candidates }
    }

    /// Build a list of passages with no metadata
    pub fn from_texts<I, S>(source: Source, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_passages(
            source,
            texts.into_iter().map(|t| (t.into(), Metadata::new())),
        )
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Keep at most `limit` candidates
    pub fn truncate(&mut self, limit: usize) {
        self.candidates.truncate(limit);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.candidates.iter()
    }
}

impl<'a> IntoIterator for &'a RankedList {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}
