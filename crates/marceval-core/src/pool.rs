//! Worker pool for batch evaluation.
//!
//! A fixed number of worker tasks pull [`EvalJob`]s from a shared queue and
//! answer each through its own oneshot channel. Workers share nothing but the
//! read-only comparator, so no locking is involved. [`evaluate_pairs`]
//! collects answers in submission order, so the aggregator always sees a
//! complete, stably ordered list no matter which worker finished first.

use std::sync::Arc;

use marceval_record::RecordFormat;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::aggregate::EvaluationOutcome;
use crate::compare::FieldComparator;
use crate::{EvalError, ProgressEvent};

/// One (reference, candidate) pair to evaluate.
#[derive(Debug, Clone, Default)]
pub struct EvalPair {
    pub id: String,
    pub reference: Vec<u8>,
    pub reference_format: Option<RecordFormat>,
    /// `None` when the generator produced nothing.
    pub candidate: Option<Vec<u8>>,
    pub candidate_format: Option<RecordFormat>,
    /// Upstream generation failure; the pair is recorded as failed.
    pub generation_error: Option<String>,
    pub processing_time_ms: Option<u64>,
}

/// Pool sizing and filtering.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub num_workers: usize,
    /// Skip pairs whose reference leader marks the record deleted.
    pub skip_withdrawn: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: crate::DEFAULT_WORKERS,
            skip_withdrawn: true,
        }
    }
}

/// An evaluation job submitted to the pool.
pub struct EvalJob {
    pub pair: EvalPair,
    pub result_tx: oneshot::Sender<EvaluationOutcome>,
    pub index: usize,
    pub total: usize,
    pub progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
}

/// Run the parse → compare pipeline for one pair. Never fails: every
/// problem becomes a failed outcome.
pub fn evaluate_pair(
    comparator: &FieldComparator,
    pair: &EvalPair,
    skip_withdrawn: bool,
) -> EvaluationOutcome {
    let reference_text = Some(String::from_utf8_lossy(&pair.reference).into_owned());
    let candidate_text = pair
        .candidate
        .as_deref()
        .map(|c| String::from_utf8_lossy(c).into_owned());

    if skip_withdrawn
        && matches!(
            marceval_record::is_withdrawn(&pair.reference, pair.reference_format),
            Ok(true)
        )
    {
        tracing::debug!(id = %pair.id, "reference withdrawn, skipping");
        return EvaluationOutcome::withdrawn(&pair.id)
            .with_processing_time(pair.processing_time_ms)
            .with_records(reference_text, candidate_text);
    }

    let result = match (&pair.generation_error, &pair.candidate) {
        (Some(err), _) => Err(EvalError::Generation(err.clone())),
        (None, None) => Err(EvalError::NoCandidate),
        (None, Some(candidate)) => comparator.compare_raw(
            &pair.reference,
            pair.reference_format,
            candidate,
            pair.candidate_format,
        ),
    };

    let outcome = match result {
        Ok(comparison) => EvaluationOutcome::success(&pair.id, comparison),
        Err(e) => {
            tracing::warn!(id = %pair.id, error = %e, "record evaluation failed");
            EvaluationOutcome::failure(&pair.id, e.to_string())
        }
    };
    outcome
        .with_processing_time(pair.processing_time_ms)
        .with_records(reference_text, candidate_text)
}

/// A pool of worker tasks evaluating record pairs.
///
/// Submit jobs via [`submit()`](EvaluationPool::submit) and read results
/// from the oneshot receiver created with each job.
pub struct EvaluationPool {
    job_tx: async_channel::Sender<EvalJob>,
    pool_handle: JoinHandle<()>,
}

impl EvaluationPool {
    /// Spawn `config.num_workers` workers (at least one).
    pub fn new(
        comparator: Arc<FieldComparator>,
        config: PoolConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<EvalJob>();
        let num_workers = config.num_workers.max(1);

        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers);
            for _ in 0..num_workers {
                handles.push(tokio::spawn(worker_loop(
                    job_rx.clone(),
                    comparator.clone(),
                    config.skip_withdrawn,
                    cancel.clone(),
                )));
            }

            // Workers hold the only receivers now; they exit when job_tx closes.
            drop(job_rx);

            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    /// Get a cloneable sender for submitting jobs from multiple tasks.
    pub fn sender(&self) -> async_channel::Sender<EvalJob> {
        self.job_tx.clone()
    }

    pub async fn submit(&self, job: EvalJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Close the queue and wait for workers to drain it.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn worker_loop(
    job_rx: async_channel::Receiver<EvalJob>,
    comparator: Arc<FieldComparator>,
    skip_withdrawn: bool,
    cancel: CancellationToken,
) {
    while let Ok(job) = job_rx.recv().await {
        // Queued but unstarted jobs are abandoned; their receivers see a
        // closed channel.
        if cancel.is_cancelled() {
            break;
        }

        let EvalJob {
            pair,
            result_tx,
            index,
            total,
            progress,
        } = job;

        progress(ProgressEvent::Evaluating {
            index,
            total,
            id: pair.id.clone(),
        });

        let outcome = evaluate_pair(&comparator, &pair, skip_withdrawn);

        let event = if outcome.withdrawn {
            ProgressEvent::Skipped {
                index,
                total,
                id: pair.id,
            }
        } else if let Some(score) = outcome.overall_score() {
            ProgressEvent::Evaluated {
                index,
                total,
                id: pair.id,
                overall_score: score,
            }
        } else {
            ProgressEvent::Failed {
                index,
                total,
                id: pair.id,
                error: outcome.error.clone().unwrap_or_default(),
            }
        };
        progress(event);

        let _ = result_tx.send(outcome);

        // Comparison is CPU-bound with no await points of its own.
        tokio::task::yield_now().await;
    }
}

/// Evaluate a batch of pairs.
///
/// Creates an internal [`EvaluationPool`], submits every pair, then awaits
/// the results in submission order. Cancelling stops further submission;
/// pairs already being compared finish, and only completed outcomes are
/// returned.
pub async fn evaluate_pairs(
    pairs: Vec<EvalPair>,
    comparator: Arc<FieldComparator>,
    config: PoolConfig,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Vec<EvaluationOutcome> {
    let total = pairs.len();
    if total == 0 {
        return vec![];
    }

    tracing::info!(total, workers = config.num_workers.max(1), "starting evaluation");

    let progress: Arc<dyn Fn(ProgressEvent) + Send + Sync> = Arc::new(progress);
    let pool = EvaluationPool::new(comparator, config, cancel.clone());

    let mut receivers = Vec::with_capacity(total);
    for (index, pair) in pairs.into_iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }

        let (result_tx, result_rx) = oneshot::channel();
        pool.submit(EvalJob {
            pair,
            result_tx,
            index,
            total,
            progress: progress.clone(),
        })
        .await;
        receivers.push(result_rx);
    }

    let mut outcomes = Vec::with_capacity(receivers.len());
    for rx in receivers {
        if let Ok(outcome) = rx.await {
            outcomes.push(outcome);
        }
    }

    pool.shutdown().await;

    tracing::info!(completed = outcomes.len(), total, "evaluation finished");
    outcomes
}
