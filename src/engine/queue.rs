//! Single-consumer serialization of concurrent callers onto one engine.
//!
//! The wrapped engine process accepts one command stream; concurrent
//! callers would corrupt its state. The queue funnels all requests
//! through a bounded channel drained by exactly one worker task, so at
//! most one engine call is in flight per process at any instant.
//! Submission order is preserved across concurrent callers, and a failure
//! inside one job is delivered to that caller alone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::Engine;
use super::types::{AnalysisRequest, EvaluationInfo};
use crate::error::{EngineError, EngineResult};

/// Standard chess starting position, used for health probes.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

struct Job {
    request: AnalysisRequest,
    reply: oneshot::Sender<EngineResult<Vec<EvaluationInfo>>>,
    enqueued_at: Instant,
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    failed: AtomicU64,
    wait_us: AtomicU64,
}

/// Point-in-time queue metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct QueueMetrics {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub avg_wait_us: u64,
    pub queue_depth: usize,
}

/// FIFO request queue in front of one engine process.
pub struct EngineQueue {
    engine_name: String,
    tx: mpsc::Sender<Job>,
    worker: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl EngineQueue {
    /// Take ownership of an engine and start the worker task draining
    /// requests into it.
    pub fn spawn(engine: Box<dyn Engine>, capacity: usize) -> Self {
        let engine_name = engine.name().to_string();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(worker_loop(engine, rx, Arc::clone(&counters)));
        debug!(engine = %engine_name, capacity = capacity, "Engine queue started");
        Self {
            engine_name,
            tx,
            worker,
            counters,
        }
    }

    /// Name of the engine instance this queue serializes onto.
    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    /// Submit one analysis request and await its result. Errors raised by
    /// the engine for this request are returned here and nowhere else.
    pub async fn analyse(&self, request: AnalysisRequest) -> EngineResult<Vec<EvaluationInfo>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            request,
            reply: reply_tx,
            enqueued_at: Instant::now(),
        };
        self.tx.send(job).await.map_err(|_| EngineError::Unavailable {
            message: format!("queue for {} is closed", self.engine_name),
            retries: 0,
        })?;
        reply_rx.await.map_err(|_| EngineError::Unavailable {
            message: format!("worker for {} dropped the request", self.engine_name),
            retries: 0,
        })?
    }

    /// Lightweight round-trip probe: a minimal-depth evaluation of the
    /// start position.
    pub async fn health_check(&self) -> bool {
        self.analyse(AnalysisRequest::new(START_FEN, 1, 1))
            .await
            .is_ok()
    }

    /// Current metrics snapshot.
    pub fn metrics(&self) -> QueueMetrics {
        let total = self.counters.total.load(Ordering::Relaxed);
        let wait_us = self.counters.wait_us.load(Ordering::Relaxed);
        QueueMetrics {
            total_requests: total,
            failed_requests: self.counters.failed.load(Ordering::Relaxed),
            avg_wait_us: if total > 0 { wait_us / total } else { 0 },
            queue_depth: self.tx.max_capacity() - self.tx.capacity(),
        }
    }

    /// Close the queue and wait for the worker to quit the engine.
    pub async fn shutdown(self) -> EngineResult<()> {
        drop(self.tx);
        self.worker.await.map_err(|e| EngineError::Unavailable {
            message: format!("worker for {} panicked: {}", self.engine_name, e),
            retries: 0,
        })?;
        info!(engine = %self.engine_name, "Engine queue shut down");
        Ok(())
    }
}

async fn worker_loop(
    mut engine: Box<dyn Engine>,
    mut rx: mpsc::Receiver<Job>,
    counters: Arc<Counters>,
) {
    while let Some(job) = rx.recv().await {
        counters.total.fetch_add(1, Ordering::Relaxed);
        counters
            .wait_us
            .fetch_add(job.enqueued_at.elapsed().as_micros() as u64, Ordering::Relaxed);

        let result = engine.analyse(&job.request).await;
        if result.is_err() {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        // The caller may have abandoned the request (scan timeout); a
        // dropped receiver is not a worker failure.
        let _ = job.reply.send(result);
    }

    if let Err(e) = engine.shutdown().await {
        warn!(engine = %engine.name(), error = %e, "Engine shutdown failed");
    }
}
