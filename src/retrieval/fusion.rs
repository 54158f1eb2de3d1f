//! Reciprocal Rank Fusion algorithm for combining ranked lists

use crate::retrieval::{ContentKey, ContentKeyPolicy, FusedResult, RankedList};
use ahash::{HashMap, HashMapExt};
use std::collections::BTreeSet;
use thiserror::Error;

/// Default RRF K constant
pub const DEFAULT_RRF_K: u32 = 60;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FusionError {
    #[error("Invalid RRF K: must be greater than 0")]
    InvalidK,
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: u32,

    /// How passage text is keyed for deduplication
    pub content_key: ContentKeyPolicy,
}

impl FusionConfig {
    pub fn new(rrf_k: u32, content_key: ContentKeyPolicy) -> Result<Self, FusionError> {
        if rrf_k == 0 {
            return Err(FusionError::InvalidK);
        }

        Ok(Self { rrf_k, content_key })
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            content_key: ContentKeyPolicy::Exact,
        }
    }
}

/// Apply Reciprocal Rank Fusion to any number of ranked lists
///
/// RRF formula: score(p) = sum over lists containing p of: 1 / (k + rank)
/// with 1-based ranks. Raw backend scores play no part.
///
/// Lists are consumed in the order given; the first occurrence of a passage
/// decides its metadata and its position among equal scores. A passage
/// repeated inside one list only counts at its best rank there.
///
/// # Returns
/// Every distinct passage exactly once, sorted by fused score descending.
/// Nothing is truncated here.
pub fn reciprocal_rank_fusion(lists: &[RankedList], config: &FusionConfig) -> Vec<FusedResult> {
    let k = f64::from(config.rrf_k);
    let capacity = lists.iter().map(RankedList::len).sum();

    let mut slots: HashMap<ContentKey, usize> = HashMap::with_capacity(capacity);
    let mut fused: Vec<FusedResult> = Vec::with_capacity(capacity);

    for list in lists {
        let source = list.source();

        for (position, candidate) in list.iter().enumerate() {
            let contribution = 1.0 / (k + (position as f64) + 1.0);
            let key = ContentKey::new(&candidate.content, config.content_key);

            match slots.get(&key) {
                Some(&slot) => {
                    let entry = &mut fused[slot];
                    if entry.contributing_sources.insert(source) {
                        entry.rrf_score += contribution;
                    }
                }
                None => {
                    slots.insert(key, fused.len());
                    fused.push(FusedResult {
                        content: candidate.content.clone(),
                        metadata: candidate.metadata.clone(),
                        rrf_score: contribution,
                        contributing_sources: BTreeSet::from([source]),
                    });
                }
            }
        }
    }

    // Stable: equal scores keep first-encountered order
    fused.sort_by(|a, b| b.rrf_score.total_cmp(&a.rrf_score));

    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{Metadata, Source};
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn semantic(texts: &[&str]) -> RankedList {
        RankedList::from_texts(Source::Semantic, texts.iter().copied())
    }

    fn lexical(texts: &[&str]) -> RankedList {
        RankedList::from_texts(Source::Lexical, texts.iter().copied())
    }

    fn contents(fused: &[FusedResult]) -> Vec<&str> {
        fused.iter().map(|f| f.content.as_str()).collect()
    }

    #[test]
    fn test_rrf_consensus_ranks_first() {
        let lists = [semantic(&["D1", "D2"]), lexical(&["D2", "D3"])];
        let fused = reciprocal_rank_fusion(&lists, &FusionConfig::default());

        assert_eq!(contents(&fused), vec!["D2", "D1", "D3"]);
        assert!((fused[0].rrf_score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert!((fused[1].rrf_score - 1.0 / 61.0).abs() < 1e-12);
        assert!((fused[2].rrf_score - 1.0 / 62.0).abs() < 1e-12);
        assert_eq!(
            fused[0].contributing_sources,
            BTreeSet::from([Source::Semantic, Source::Lexical])
        );
    }

    #[test]
    fn test_rrf_single_source_preserves_order() {
        let lists = [semantic(&["A", "B", "C"]), RankedList::empty(Source::Lexical)];
        let fused = reciprocal_rank_fusion(&lists, &FusionConfig::default());

        assert_eq!(contents(&fused), vec!["A", "B", "C"]);
        for (i, result) in fused.iter().enumerate() {
            let expected = 1.0 / (60.0 + (i as f64) + 1.0);
            assert!((result.rrf_score - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rrf_ties_keep_insertion_order() {
        // Same rank in different sources gives equal scores
        let lists = [semantic(&["S1", "S2"]), lexical(&["L1", "L2"])];
        let fused = reciprocal_rank_fusion(&lists, &FusionConfig::default());

        assert_eq!(contents(&fused), vec!["S1", "L1", "S2", "L2"]);
    }

    #[test]
    fn test_rrf_keeps_first_metadata() {
        let mut first = Metadata::new();
        first.insert("from".into(), "qdrant".into());
        let mut second = Metadata::new();
        second.insert("from".into(), "elasticsearch".into());

        let lists = [
            RankedList::from_passages(Source::Semantic, [("same".to_string(), first)]),
            RankedList::from_passages(Source::Lexical, [("same".to_string(), second)]),
        ];
        let fused = reciprocal_rank_fusion(&lists, &FusionConfig::default());

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].metadata["from"], "qdrant");
    }

    #[test]
    fn test_rrf_duplicate_within_list_counts_once() {
        let lists = [semantic(&["A", "B", "A"])];
        let fused = reciprocal_rank_fusion(&lists, &FusionConfig::default());

        assert_eq!(contents(&fused), vec!["A", "B"]);
        assert!((fused[0].rrf_score - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_rrf_whitespace_policy() {
        let lists = [semantic(&["Điều 5.  Phạt"]), lexical(&["Điều 5. Phạt"])];

        let exact = reciprocal_rank_fusion(&lists, &FusionConfig::default());
        assert_eq!(exact.len(), 2);

        let config = FusionConfig::new(60, ContentKeyPolicy::CollapseWhitespace).unwrap();
        let collapsed = reciprocal_rank_fusion(&lists, &config);
        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed[0].content, "Điều 5.  Phạt");
    }

    #[test]
    fn test_rrf_empty_inputs() {
        let lists = [RankedList::empty(Source::Semantic), RankedList::empty(Source::Lexical)];
        assert!(reciprocal_rank_fusion(&lists, &FusionConfig::default()).is_empty());
        assert!(reciprocal_rank_fusion(&[], &FusionConfig::default()).is_empty());
    }

    #[test]
    fn test_invalid_k() {
        assert_eq!(
            FusionConfig::new(0, ContentKeyPolicy::Exact).unwrap_err(),
            FusionError::InvalidK
        );
    }

    fn doc_list() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-e]{1,2}", 0..12)
    }

    proptest! {
        #[test]
        fn prop_fusion_is_complete_unique_and_sorted(
            sem in doc_list(),
            lex in doc_list(),
            k in 1u32..200,
        ) {
            let lists = [
                RankedList::from_texts(Source::Semantic, sem.clone()),
                RankedList::from_texts(Source::Lexical, lex.clone()),
            ];
            let config = FusionConfig::new(k, ContentKeyPolicy::Exact).unwrap();
            let fused = reciprocal_rank_fusion(&lists, &config);

            let expected: HashSet<&String> = sem.iter().chain(lex.iter()).collect();
            let seen: HashSet<&String> = fused.iter().map(|f| &f.content).collect();
            prop_assert_eq!(seen.len(), fused.len());
            prop_assert_eq!(seen, expected);

            for pair in fused.windows(2) {
                prop_assert!(pair[0].rrf_score >= pair[1].rrf_score);
            }
        }
    }
}
