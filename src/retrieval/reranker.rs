//! Cross-encoder rerank stage with fusion-order fallback

use crate::clients::RerankClient;
use crate::retrieval::fanout::remaining_budget;
use crate::retrieval::{FusedResult, Provenance, RerankedResult, RetrievalEvent};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Candidates sent to the reranker per requested result
pub const RERANK_WINDOW_FACTOR: usize = 2;

/// Refines the head of the fused ranking with a [`RerankClient`]
pub struct RerankStage {
    client: Arc<dyn RerankClient>,
    timeout: Duration,
}

impl RerankStage {
    pub fn new(client: Arc<dyn RerankClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Rerank the best `min(len, top_n * 2)` fused candidates
    ///
    /// # Arguments
    /// * `query` - Search query
    /// * `candidates` - Fused passages, best first
    /// * `top_n` - Number of results to return
    /// * `deadline` - Query deadline capping the rerank timeout
    ///
    /// # Returns
    /// At most `top_n` results. If the reranker errors, times out or answers
    /// with unusable scores, the first `top_n` fused candidates are returned in
    /// fusion order tagged `FusionFallback`, together with a `RerankFailure`.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<FusedResult>,
        top_n: usize,
        deadline: Option<Instant>,
    ) -> (Vec<RerankedResult>, Option<RetrievalEvent>) {
        if candidates.is_empty() {
            debug!("Nothing to rerank");
            return (Vec::new(), Some(RetrievalEvent::EmptyCandidateSet));
        }
        if top_n == 0 {
            return (Vec::new(), None);
        }

        let window = candidates.len().min(top_n.saturating_mul(RERANK_WINDOW_FACTOR));
        let texts: Vec<String> = candidates[..window]
            .iter()
            .map(|c| c.content.clone())
            .collect();

        let timeout = remaining_budget(self.timeout, deadline);
        debug!(
            "Reranking {} of {} candidates with {} (timeout {:?})",
            window,
            candidates.len(),
            self.client.name(),
            timeout
        );

        let scored = match tokio::time::timeout(timeout, self.client.rerank(query, &texts, top_n)).await
        {
            Ok(Ok(pairs)) => validate_scores(pairs, window, top_n.min(window)),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", timeout)),
        };

        match scored {
            Ok(scored) => (apply_scores(candidates, scored, top_n), None),
            Err(reason) => {
                warn!("Reranker {} failed, keeping fusion order: {}", self.client.name(), reason);
                let fallback = candidates
                    .into_iter()
                    .take(top_n)
                    .map(RerankedResult::fallback)
                    .collect();
                (fallback, Some(RetrievalEvent::RerankFailure(reason)))
            }
        }
    }
}

/// Reject responses that cannot be mapped back onto the submitted window
///
/// At least `required` distinct indices must be scored, otherwise the stage
/// would return fewer passages than the fused list can supply.
fn validate_scores(
    pairs: Vec<(usize, f32)>,
    window: usize,
    required: usize,
) -> Result<Vec<(usize, f64)>, String> {
    if pairs.is_empty() {
        return Err("reranker returned no scores".to_string());
    }
    if pairs.len() < required {
        return Err(format!(
            "reranker scored {} of {} required candidates",
            pairs.len(),
            required
        ));
    }

    let mut seen = HashSet::with_capacity(pairs.len());
    let mut scored = Vec::with_capacity(pairs.len());
    for (index, score) in pairs {
        if index >= window {
            return Err(format!(
                "score index {} out of range for {} candidates",
                index, window
            ));
        }
        if !seen.insert(index) {
            return Err(format!("duplicate score for index {}", index));
        }
        if !score.is_finite() {
            return Err(format!("non-finite score for index {}", index));
        }
        scored.push((index, f64::from(score)));
    }

    Ok(scored)
}

fn apply_scores(
    candidates: Vec<FusedResult>,
    mut scored: Vec<(usize, f64)>,
    top_n: usize,
) -> Vec<RerankedResult> {
    // Stable: equal scores keep the order the reranker reported them in
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_n);

    let mut slots: Vec<Option<FusedResult>> = candidates.into_iter().map(Some).collect();
    scored
        .into_iter()
        .filter_map(|(index, score)| {
            slots[index].take().map(|fused| RerankedResult {
                content: fused.content,
                metadata: fused.metadata,
                rerank_score: score,
                provenance: Provenance::Reranked,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::BackendError;
    use crate::retrieval::{Metadata, Source};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    enum Behavior {
        /// Score = position in the reversed window
        Reverse,
        Fixed(Vec<(usize, f32)>),
        Fail,
        Hang,
    }

    struct ScriptedReranker {
        behavior: Behavior,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedReranker {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RerankClient for ScriptedReranker {
        async fn rerank(
            &self,
            _query: &str,
            texts: &[String],
            _top_n: usize,
        ) -> Result<Vec<(usize, f32)>, BackendError> {
            self.seen.lock().unwrap().push(texts.to_vec());
            match &self.behavior {
                Behavior::Reverse => Ok((0..texts.len()).map(|i| (i, i as f32)).collect()),
                Behavior::Fixed(pairs) => Ok(pairs.clone()),
                Behavior::Fail => Err(BackendError::HttpStatus {
                    status: 503,
                    message: "overloaded".to_string(),
                }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn fused(docs: &[&str]) -> Vec<FusedResult> {
        docs.iter()
            .enumerate()
            .map(|(i, doc)| FusedResult {
                content: doc.to_string(),
                metadata: Metadata::new(),
                rrf_score: 1.0 / (61.0 + i as f64),
                contributing_sources: BTreeSet::from([Source::Semantic]),
            })
            .collect()
    }

    fn contents(results: &[RerankedResult]) -> Vec<&str> {
        results.iter().map(|r| r.content.as_str()).collect()
    }

    #[tokio::test]
    async fn test_rerank_reorders_window() {
        let client = ScriptedReranker::new(Behavior::Reverse);
        let stage = RerankStage::new(client.clone(), Duration::from_secs(1));

        let (results, event) = stage
            .rerank("q", fused(&["A", "B", "C", "D", "E", "F"]), 2, None)
            .await;

        // Window is top_n * 2 = 4 candidates
        assert_eq!(client.calls(), vec![vec!["A", "B", "C", "D"]]);
        assert_eq!(contents(&results), vec!["D", "C"]);
        assert!(results.iter().all(RerankedResult::is_reranked));
        assert_eq!(results[0].rerank_score, 3.0);
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn test_window_smaller_than_twice_top_n() {
        let client = ScriptedReranker::new(Behavior::Reverse);
        let stage = RerankStage::new(client.clone(), Duration::from_secs(1));

        let (results, _) = stage.rerank("q", fused(&["A", "B"]), 5, None).await;

        assert_eq!(client.calls()[0].len(), 2);
        assert_eq!(contents(&results), vec!["B", "A"]);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_fusion_order() {
        let stage = RerankStage::new(ScriptedReranker::new(Behavior::Fail), Duration::from_secs(1));
        let candidates = fused(&["A", "B", "C"]);
        let expected_score = candidates[0].rrf_score;

        let (results, event) = stage.rerank("q", candidates, 2, None).await;

        assert_eq!(contents(&results), vec!["A", "B"]);
        assert!(results
            .iter()
            .all(|r| r.provenance == Provenance::FusionFallback));
        assert_eq!(results[0].rerank_score, expected_score);
        assert!(matches!(event, Some(RetrievalEvent::RerankFailure(reason)) if reason.contains("503")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back() {
        let stage = RerankStage::new(ScriptedReranker::new(Behavior::Hang), Duration::from_millis(50));

        let (results, event) = stage.rerank("q", fused(&["A", "B"]), 1, None).await;

        assert_eq!(contents(&results), vec!["A"]);
        assert!(matches!(event, Some(RetrievalEvent::RerankFailure(reason)) if reason.contains("timed out")));
    }

    #[tokio::test]
    async fn test_malformed_responses_fall_back() {
        let cases = vec![
            vec![(0, 0.5), (9, 0.4)],
            vec![(1, 0.5), (1, 0.4)],
            vec![(0, f32::NAN)],
            vec![],
        ];

        for pairs in cases {
            let stage = RerankStage::new(
                ScriptedReranker::new(Behavior::Fixed(pairs.clone())),
                Duration::from_secs(1),
            );
            let (results, event) = stage.rerank("q", fused(&["A", "B", "C"]), 2, None).await;

            assert_eq!(contents(&results), vec!["A", "B"], "pairs: {:?}", pairs);
            assert!(matches!(event, Some(RetrievalEvent::RerankFailure(_))));
        }
    }

    #[tokio::test]
    async fn test_top_n_subset_is_accepted() {
        // Adapters may return only their top_n
        let stage = RerankStage::new(
            ScriptedReranker::new(Behavior::Fixed(vec![(1, 0.5), (3, 0.9)])),
            Duration::from_secs(1),
        );

        let (results, event) = stage
            .rerank("q", fused(&["A", "B", "C", "D", "E", "F"]), 2, None)
            .await;

        assert_eq!(contents(&results), vec!["D", "B"]);
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn test_short_response_falls_back() {
        let stage = RerankStage::new(
            ScriptedReranker::new(Behavior::Fixed(vec![(2, 0.9)])),
            Duration::from_secs(1),
        );

        let (results, event) = stage.rerank("q", fused(&["A", "B", "C"]), 2, None).await;

        assert_eq!(contents(&results), vec!["A", "B"]);
        assert!(results
            .iter()
            .all(|r| r.provenance == Provenance::FusionFallback));
        assert!(matches!(event, Some(RetrievalEvent::RerankFailure(reason)) if reason.contains("1 of 2")));
    }

    #[tokio::test]
    async fn test_small_window_needs_every_index() {
        // Two candidates, top_n 5: both must be scored
        let stage = RerankStage::new(
            ScriptedReranker::new(Behavior::Fixed(vec![(0, 0.1)])),
            Duration::from_secs(1),
        );

        let (results, event) = stage.rerank("q", fused(&["A", "B"]), 5, None).await;

        assert_eq!(contents(&results), vec!["A", "B"]);
        assert!(matches!(event, Some(RetrievalEvent::RerankFailure(_))));
    }

    #[tokio::test]
    async fn test_empty_candidates_skip_client() {
        let client = ScriptedReranker::new(Behavior::Reverse);
        let stage = RerankStage::new(client.clone(), Duration::from_secs(1));

        let (results, event) = stage.rerank("q", Vec::new(), 3, None).await;

        assert!(results.is_empty());
        assert_eq!(event, Some(RetrievalEvent::EmptyCandidateSet));
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_validate_scores_converts() {
        let scored = validate_scores(vec![(1, 0.25), (0, -1.5)], 2, 2).unwrap();
        assert_eq!(scored, vec![(1, 0.25), (0, -1.5)]);
    }
}
