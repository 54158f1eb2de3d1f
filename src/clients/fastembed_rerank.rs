//! In-process cross-encoder reranking behind a bounded worker pool
//!
//! Model inference is blocking and CPU heavy. Queries submit jobs to a bounded
//! queue; a dispatcher runs at most `workers` jobs at once on tokio's blocking
//! pool, so a slow batch never occupies an async worker thread.

use super::{BackendError, RerankClient};
use async_trait::async_trait;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Blocking cross-encoder model
pub trait CrossEncoder: Send + Sync + 'static {
    /// Score every `(query, documents[i])` pair, returning `(i, score)`
    fn score(&self, query: &str, documents: &[String]) -> Result<Vec<(usize, f32)>, BackendError>;

    fn model_name(&self) -> &str;
}

/// FastEmbed ONNX cross-encoder
pub struct FastEmbedCrossEncoder {
    model: TextRerank,
    model_name: String,
}

impl FastEmbedCrossEncoder {
    /// Load a reranker model, downloading it on first use
    ///
    /// Supported: `BAAI/bge-reranker-base`, `BAAI/bge-reranker-v2-m3` (multilingual,
    /// handles Vietnamese).
    pub fn new(model_name: &str) -> Result<Self, BackendError> {
        let model = match model_name {
            "BAAI/bge-reranker-base" | "bge-reranker-base" => RerankerModel::BGERerankerBase,
            "BAAI/bge-reranker-v2-m3" | "rozgo/bge-reranker-v2-m3" | "bge-reranker-v2-m3" => {
                RerankerModel::BGERerankerV2M3
            }
            _ => {
                return Err(BackendError::InitializationError(format!(
                    "Unsupported reranker model: {}. Supported: BAAI/bge-reranker-base, BAAI/bge-reranker-v2-m3",
                    model_name
                )));
            }
        };

        info!("Initializing reranker model: {}", model_name);

        let init_options = RerankInitOptions::new(model).with_show_download_progress(true);
        let model = TextRerank::try_new(init_options)
            .map_err(|e| BackendError::InitializationError(e.to_string()))?;

        Ok(Self {
            model,
            model_name: model_name.to_string(),
        })
    }
}

impl CrossEncoder for FastEmbedCrossEncoder {
    fn score(&self, query: &str, documents: &[String]) -> Result<Vec<(usize, f32)>, BackendError> {
        if query.is_empty() {
            return Err(BackendError::InvalidInput("Query cannot be empty".to_string()));
        }

        let documents: Vec<&str> = documents.iter().map(|s| s.as_str()).collect();
        let results = self
            .model
            .rerank(query, documents, false, None)
            .map_err(|e| BackendError::InferenceError(e.to_string()))?;

        Ok(results.into_iter().map(|r| (r.index, r.score)).collect())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

type JobReply = oneshot::Sender<Result<Vec<(usize, f32)>, BackendError>>;

struct RerankJob {
    query: String,
    documents: Vec<String>,
    top_n: usize,
    reply: JobReply,
}

/// Queue-fronted pool running a [`CrossEncoder`] on the blocking thread pool
pub struct RerankWorkerPool {
    jobs: mpsc::Sender<RerankJob>,
    dispatcher: Option<JoinHandle<()>>,
    model_name: String,
}

impl RerankWorkerPool {
    /// Start the pool; must be called inside a tokio runtime
    ///
    /// # Arguments
    /// * `encoder` - Shared model
    /// * `workers` - Maximum concurrent inference jobs
    /// * `queue_capacity` - Pending jobs accepted before submitters wait
    pub fn new<E: CrossEncoder>(encoder: Arc<E>, workers: usize, queue_capacity: usize) -> Self {
        let (jobs, job_rx) = mpsc::channel(queue_capacity.max(1));
        let model_name = encoder.model_name().to_string();
        let dispatcher = tokio::spawn(dispatch(job_rx, encoder, workers.max(1)));

        Self {
            jobs,
            dispatcher: Some(dispatcher),
            model_name,
        }
    }

    /// Stop accepting jobs and wait for in-flight ones to finish
    pub async fn shutdown(mut self) {
        let (closed, _) = mpsc::channel(1);
        drop(std::mem::replace(&mut self.jobs, closed));

        if let Some(handle) = self.dispatcher.take() {
            info!("Waiting for rerank workers to drain...");
            if let Err(e) = handle.await {
                warn!("Rerank dispatcher failed during shutdown: {}", e);
            }
        }
    }
}

async fn dispatch<E: CrossEncoder>(
    mut job_rx: mpsc::Receiver<RerankJob>,
    encoder: Arc<E>,
    workers: usize,
) {
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut in_flight = Vec::new();

    while let Some(job) = job_rx.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        // The query gave up (deadline or timeout) while the job was queued
        if job.reply.is_closed() {
            debug!("Dropping abandoned rerank job");
            continue;
        }

        let encoder = encoder.clone();
        in_flight.retain(|h: &JoinHandle<()>| !h.is_finished());
        in_flight.push(tokio::spawn(async move {
            let RerankJob {
                query,
                documents,
                top_n,
                reply,
            } = job;

            let result = tokio::task::spawn_blocking(move || {
                let mut scored = encoder.score(&query, &documents)?;
                scored.sort_by(|a, b| b.1.total_cmp(&a.1));
                scored.truncate(top_n);
                Ok(scored)
            })
            .await
            .unwrap_or_else(|e| Err(BackendError::InferenceError(format!("Worker panicked: {}", e))));

            drop(permit);

            if reply.send(result).is_err() {
                debug!("Rerank result discarded: requester gone");
            }
        }));
    }

    for handle in in_flight {
        if let Err(e) = handle.await {
            warn!("Rerank worker task failed: {}", e);
        }
    }
}

#[async_trait]
impl RerankClient for RerankWorkerPool {
    async fn rerank(
        &self,
        query: &str,
        texts: &[String],
        top_n: usize,
    ) -> Result<Vec<(usize, f32)>, BackendError> {
        if texts.is_empty() {
            return Err(BackendError::InvalidInput(
                "No documents to rerank".to_string(),
            ));
        }

        let (reply, response) = oneshot::channel();
        let job = RerankJob {
            query: query.to_string(),
            documents: texts.to_vec(),
            top_n,
            reply,
        };

        self.jobs
            .send(job)
            .await
            .map_err(|_| BackendError::WorkerUnavailable("Rerank queue closed".to_string()))?;

        response
            .await
            .map_err(|_| BackendError::WorkerUnavailable("Rerank worker dropped the job".to_string()))?
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
