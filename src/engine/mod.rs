//! Engine coordination layer.
//!
//! This module provides the path from analysis requests to UCI engine
//! subprocesses:
//! - [`Engine`]: the position-evaluation capability (trait seam)
//! - [`UciEngine`]: subprocess client speaking the UCI protocol
//! - [`EngineQueue`]: FIFO serialization onto one stateful process
//! - [`EnginePool`]: N independent instances for bounded parallelism

mod client;
mod pool;
mod queue;
mod types;

pub use client::{Engine, UciEngine};
pub use pool::{EnginePool, SingleAnalysis};
pub use queue::{EngineQueue, QueueMetrics, START_FEN};
pub use types::{to_relative, AnalysisRequest, EvaluationInfo, RawScore, MATE_SCORE_CP};
