//! Retrieval quality evaluation: hit rate@k, MRR and context recall

use crate::error::{LawragError, Result};
use crate::retrieval::{RankedPassage, RetrievalOutcome};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Ground-truth words shorter than this are ignored by context recall
const MIN_RECALL_WORD_CHARS: usize = 4;
/// Question words shorter than this are ignored by article relevance
const MIN_QUESTION_TERM_CHARS: usize = 5;
const PREVIEW_CHARS: usize = 150;

/// One labelled question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalItem {
    pub question: String,

    /// Keywords marking a relevant passage (any one suffices)
    #[serde(default)]
    pub contexts: Vec<String>,

    /// Reference answer used for context recall
    #[serde(default, alias = "expected_answer")]
    pub ground_truth: String,

    /// Expected legal article, e.g. "Điều 6"; replaces keyword relevance when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_article: Option<String>,
}

/// Metrics for one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question: String,
    pub num_retrieved: usize,
    pub hit: bool,
    pub mrr: f64,
    pub context_recall: f64,
    pub top_doc_preview: String,
    /// Degradations reported by the retriever, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<String>,
}

/// Averages over the dataset
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub questions: usize,
    pub hits: usize,
    pub hit_rate: f64,
    pub mrr: f64,
    pub context_recall: f64,
}

/// Saved evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub timestamp: String,
    pub k: usize,
    pub use_rerank: bool,
    pub metrics: EvalMetrics,
    pub results: Vec<QuestionResult>,
}

/// Load a JSON array of [`EvalItem`]
pub fn load_dataset(path: &Path) -> Result<Vec<EvalItem>> {
    let content = std::fs::read_to_string(path).map_err(|e| LawragError::Io {
        source: e,
        context: format!("Failed to read dataset {}", path.display()),
    })?;

    serde_json::from_str(&content).map_err(|e| LawragError::Json {
        source: e,
        context: format!("Invalid dataset {}", path.display()),
    })
}

/// Scores retrieved passages against labelled questions
pub struct Evaluator {
    article_number: Regex,
}

impl Evaluator {
    pub fn new() -> Result<Self> {
        let article_number = Regex::new(r"\d+")
            .map_err(|e| LawragError::Other(anyhow::anyhow!("Invalid article pattern: {}", e)))?;
        Ok(Self { article_number })
    }

    /// Run every question through `retrieve` and aggregate the metrics
    pub fn evaluate<F>(&self, items: &[EvalItem], k: usize, use_rerank: bool, mut retrieve: F) -> EvalReport
    where
        F: FnMut(&str) -> RetrievalOutcome,
    {
        let mut results = Vec::with_capacity(items.len());

        for (i, item) in items.iter().enumerate() {
            let outcome = retrieve(&item.question);
            let result = self.score_question(item, &outcome);

            info!(
                "[{}/{}] hit={} mrr={:.3} recall={:.3}",
                i + 1,
                items.len(),
                result.hit,
                result.mrr,
                result.context_recall
            );
            results.push(result);
        }

        EvalReport {
            timestamp: chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
            k,
            use_rerank,
            metrics: aggregate(&results),
            results,
        }
    }

    pub fn score_question(&self, item: &EvalItem, outcome: &RetrievalOutcome) -> QuestionResult {
        let passages = &outcome.passages;
        let first_relevant = passages.iter().position(|p| self.is_relevant(p, item));

        QuestionResult {
            question: item.question.clone(),
            num_retrieved: passages.len(),
            hit: first_relevant.is_some(),
            mrr: first_relevant.map(|i| 1.0 / (i + 1) as f64).unwrap_or(0.0),
            context_recall: context_recall(passages, &item.ground_truth),
            top_doc_preview: passages
                .first()
                .map(|p| p.preview(PREVIEW_CHARS))
                .unwrap_or_default(),
            degradations: outcome.events.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Article match when the item names one, keyword match otherwise
    pub fn is_relevant(&self, passage: &RankedPassage, item: &EvalItem) -> bool {
        match &item.expected_article {
            Some(article) if !article.is_empty() => {
                self.matches_article(passage, article, &item.question)
            }
            _ => matches_keywords(passage.content(), &item.contexts),
        }
    }

    /// The article number must appear in the passage text or its string metadata,
    /// and so must at least one substantial question word
    fn matches_article(&self, passage: &RankedPassage, article: &str, question: &str) -> bool {
        let mut full_text: Vec<String> = passage
            .metadata()
            .values()
            .filter_map(|v| v.as_str())
            .map(str::to_lowercase)
            .collect();
        full_text.push(passage.content().to_lowercase());
        let full_text = full_text.join(" ");

        if let Some(number) = self.article_number.find(article) {
            if !full_text.contains(number.as_str()) {
                return false;
            }
        }

        question
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.chars().count() >= MIN_QUESTION_TERM_CHARS)
            .any(|w| full_text.contains(w))
    }
}

fn matches_keywords(content: &str, keywords: &[String]) -> bool {
    let content = content.to_lowercase();
    keywords
        .iter()
        .any(|keyword| content.contains(&keyword.to_lowercase()))
}

/// Fraction of substantial ground-truth words found in the passages
///
/// An empty ground truth counts as fully recalled.
pub fn context_recall(passages: &[RankedPassage], ground_truth: &str) -> f64 {
    let ground_truth = ground_truth.to_lowercase();
    let wanted: HashSet<&str> = ground_truth
        .split_whitespace()
        .filter(|w| w.chars().count() >= MIN_RECALL_WORD_CHARS)
        .collect();

    if wanted.is_empty() {
        return 1.0;
    }

    let contents: Vec<String> = passages.iter().map(|p| p.content().to_lowercase()).collect();
    let found: HashSet<&str> = contents
        .iter()
        .flat_map(|c| c.split_whitespace())
        .filter(|w| wanted.contains(w))
        .collect();

    found.len() as f64 / wanted.len() as f64
}

fn aggregate(results: &[QuestionResult]) -> EvalMetrics {
    let n = results.len();
    if n == 0 {
        return EvalMetrics::default();
    }

    let hits = results.iter().filter(|r| r.hit).count();
    EvalMetrics {
        questions: n,
        hits,
        hit_rate: hits as f64 / n as f64,
        mrr: results.iter().map(|r| r.mrr).sum::<f64>() / n as f64,
        context_recall: results.iter().map(|r| r.context_recall).sum::<f64>() / n as f64,
    }
}

/// Write the report as pretty JSON
///
/// Defaults to `retrieval_eval_<timestamp>.json` in the current directory.
pub fn save_report(report: &EvalReport, output: Option<&Path>) -> Result<PathBuf> {
    let path = match output {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(format!("retrieval_eval_{}.json", report.timestamp)),
    };

    let json = serde_json::to_string_pretty(report).map_err(|e| LawragError::Json {
        source: e,
        context: "Failed to serialize evaluation report".to_string(),
    })?;

    std::fs::write(&path, json).map_err(|e| LawragError::Io {
        source: e,
        context: format!("Failed to write report {}", path.display()),
    })?;

    Ok(path)
}
