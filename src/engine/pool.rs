//! Pool of independent engine instances.
//!
//! Parallelism is bounded by pool size: each instance has its own process
//! and its own single-consumer queue, and requests are distributed
//! round-robin. Initialization is all-or-nothing; a pool value only
//! exists after every configured instance has started.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{error, info, warn};

use super::client::{Engine, UciEngine};
use super::queue::{EngineQueue, QueueMetrics};
use super::types::{AnalysisRequest, EvaluationInfo};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// Result of a pooled analysis, tagged with the serving instance.
#[derive(Debug, Clone)]
pub struct SingleAnalysis {
    /// Which instance served the request, for diagnosability.
    pub engine_id: String,
    /// Evaluation records, best line first.
    pub evals: Vec<EvaluationInfo>,
}

/// Fixed-size pool of engine queues.
pub struct EnginePool {
    queues: Vec<EngineQueue>,
    next: AtomicUsize,
}

impl EnginePool {
    /// Spawn `pool_size` UCI engine processes. Fails if any instance
    /// fails to start; instances already started are shut down before the
    /// error is returned.
    pub async fn initialize(config: &EngineConfig) -> EngineResult<Self> {
        let mut engines: Vec<EngineResult<Box<dyn Engine>>> = Vec::with_capacity(config.pool_size);
        for instance in 0..config.pool_size {
            engines.push(
                UciEngine::spawn(config, instance)
                    .await
                    .map(|e| Box::new(e) as Box<dyn Engine>),
            );
        }
        Self::assemble(engines, config.queue_capacity).await
    }

    /// All-or-nothing assembly from already-spawned (or failed) engines.
    /// Split out from [`initialize`](Self::initialize) so tests can drive
    /// it with scripted engines.
    pub async fn assemble(
        engines: Vec<EngineResult<Box<dyn Engine>>>,
        queue_capacity: usize,
    ) -> EngineResult<Self> {
        let total = engines.len();
        let mut queues = Vec::with_capacity(total);
        let mut first_error = None;

        for engine in engines {
            match engine {
                Ok(engine) => queues.push(EngineQueue::spawn(engine, queue_capacity)),
                Err(e) => {
                    error!(error = %e, "Engine instance failed to start");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            // No partial pool: tear down whatever did start.
            for queue in queues {
                if let Err(shutdown_err) = queue.shutdown().await {
                    warn!(error = %shutdown_err, "Cleanup shutdown failed");
                }
            }
            return Err(EngineError::Unavailable {
                message: format!("pool initialization failed: {}", e),
                retries: 0,
            });
        }

        if queues.is_empty() {
            return Err(EngineError::Unavailable {
                message: "pool initialized with zero instances".to_string(),
                retries: 0,
            });
        }

        info!(instances = queues.len(), "Engine pool initialized");
        Ok(Self {
            queues,
            next: AtomicUsize::new(0),
        })
    }

    /// Number of instances in the pool.
    pub fn size(&self) -> usize {
        self.queues.len()
    }

    /// Route one analysis request to the next instance round-robin.
    pub async fn analyze_single(
        &self,
        fen: &str,
        depth: u32,
        multipv: usize,
    ) -> EngineResult<SingleAnalysis> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        let queue = &self.queues[index];
        let evals = queue
            .analyse(AnalysisRequest::new(fen, depth, multipv))
            .await?;
        Ok(SingleAnalysis {
            engine_id: queue.engine_name().to_string(),
            evals,
        })
    }

    /// True iff every instance round-trips a minimal probe.
    pub async fn health_check(&self) -> bool {
        for queue in &self.queues {
            if !queue.health_check().await {
                return false;
            }
        }
        true
    }

    /// Metrics per instance, in pool order.
    pub fn metrics(&self) -> Vec<(String, QueueMetrics)> {
        self.queues
            .iter()
            .map(|q| (q.engine_name().to_string(), q.metrics()))
            .collect()
    }

    /// Terminate every instance, tolerating per-instance failures.
    pub async fn shutdown(self) {
        for queue in self.queues {
            let name = queue.engine_name().to_string();
            if let Err(e) = queue.shutdown().await {
                warn!(engine = %name, error = %e, "Instance shutdown failed");
            }
        }
        info!("Engine pool shut down");
    }
}
