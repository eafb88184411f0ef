//! Bounded-concurrency job worker with enqueue-time deduplication.
//!
//! The durable queue transport is a collaborator; this module implements
//! its contract in-process: dedup by signature at enqueue, bounded
//! concurrency, per-job timeout with bounded redelivery, and
//! success/failure events surfaced as structured logs only. Processing is
//! idempotent by construction, so redelivery after a partial failure is
//! safe.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use poolscope_protocols::rpc::ChainRpc;

use crate::pipeline::Pipeline;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs processed concurrently.
    pub concurrency: usize,
    /// A job past this deadline is abandoned and redelivered.
    pub job_timeout: Duration,
    /// Delivery attempts before a job is dropped.
    pub max_attempts: u8,
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            job_timeout: Duration::from_secs(60),
            max_attempts: 3,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone)]
struct Job {
    signature: String,
    attempt: u8,
}

/// Producer half: enqueue with a dedup key so the same signature is never
/// queued twice concurrently.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl JobQueue {
    /// Returns false when the signature is already queued or in flight.
    pub async fn enqueue(&self, signature: &str) -> bool {
        {
            let mut pending = self.pending.lock().await;
            if !pending.insert(signature.to_string()) {
                debug!(signature, "duplicate signature, not enqueued");
                return false;
            }
        }
        let job = Job {
            signature: signature.to_string(),
            attempt: 1,
        };
        if self.sender.send(job).await.is_err() {
            error!(signature, "worker stopped, job dropped");
            self.pending.lock().await.remove(signature);
            return false;
        }
        true
    }
}

/// Spawns the consumer loop. Each job fetches its transaction, runs it
/// through the pipeline, and reports success or failure through logging.
pub fn spawn_worker(
    config: WorkerConfig,
    rpc: Arc<ChainRpc>,
    pipeline: Arc<Pipeline>,
) -> (JobQueue, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::channel::<Job>(config.queue_capacity);
    let pending = Arc::new(Mutex::new(HashSet::new()));
    let queue = JobQueue {
        sender: sender.clone(),
        pending: pending.clone(),
    };

    let handle = tokio::spawn(async move {
        let semaphore = Arc::new(Semaphore::new(config.concurrency));
        while let Some(job) = receiver.recv().await {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let rpc = rpc.clone();
            let pipeline = pipeline.clone();
            let pending = pending.clone();
            let redeliver = sender.clone();
            let config = config.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let outcome =
                    tokio::time::timeout(config.job_timeout, process(&rpc, &pipeline, &job)).await;

                match outcome {
                    Ok(Ok(swaps)) => {
                        info!(id = %job.signature, swaps, "job.success");
                        pending.lock().await.remove(&job.signature);
                    }
                    Ok(Err(err)) => {
                        error!(id = %job.signature, error = %err, attempt = job.attempt, "job.failed");
                        requeue(job, &config, &redeliver, &pending).await;
                    }
                    Err(_) => {
                        error!(id = %job.signature, attempt = job.attempt, "job.timeout");
                        requeue(job, &config, &redeliver, &pending).await;
                    }
                }
            });
        }
    });

    (queue, handle)
}

async fn requeue(
    job: Job,
    config: &WorkerConfig,
    sender: &mpsc::Sender<Job>,
    pending: &Arc<Mutex<HashSet<String>>>,
) {
    if job.attempt >= config.max_attempts {
        error!(id = %job.signature, "job.dropped");
        pending.lock().await.remove(&job.signature);
        return;
    }
    let retry = Job {
        signature: job.signature.clone(),
        attempt: job.attempt + 1,
    };
    if sender.send(retry).await.is_err() {
        pending.lock().await.remove(&job.signature);
    }
}

async fn process(
    rpc: &ChainRpc,
    pipeline: &Pipeline,
    job: &Job,
) -> Result<usize, crate::error::EngineError> {
    let Some(tx) = rpc.get_transaction(&job.signature).await? else {
        debug!(signature = %job.signature, "transaction not found");
        return Ok(0);
    };
    Ok(pipeline.process(&tx).await?.len())
}
