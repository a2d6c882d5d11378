//! # Chess Scout
//!
//! Coordinates concurrent access to external UCI engine subprocesses and
//! performs bounded dual-depth exploratory search over move trees,
//! producing structured evidence (evaluations, principal variations,
//! annotated move sequences) for downstream narrative generation.
//!
//! ## Features
//!
//! - **Engine Queue**: FIFO serialization of concurrent callers onto one
//!   stateful engine process, with per-request failure isolation
//! - **Engine Pool**: N independent engine processes, all-or-nothing
//!   initialization, round-robin request routing
//! - **Dual-Depth Investigation**: shallow breadth sweep plus deep
//!   verification, flagging moves whose shallow appeal evaporates under
//!   reply search
//! - **Goal-Directed Search**: beam search for a witness line satisfying
//!   a declarative predicate, under bounded effort
//! - **Evidence Reduction**: compact primary-claim/rejected/threats
//!   bundle for a narration collaborator
//! - **Confidence Signals**: bounded heuristics from evaluation deltas
//! - **Board Tree Store**: TTL-evicting in-memory cache of explored
//!   trees keyed by session
//!
//! ## Architecture
//!
//! ```text
//! Caller → Investigator → Engine Pool → Engine Queue → UCI subprocess
//!              ↓
//!        Evidence Reducer → Confidence Estimator → compact result
//!              ↓
//!        Board Tree Store (per-session, TTL)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use chess_scout::{Config, EnginePool, Investigator, ScanPolicy, ScoutContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let pool = Arc::new(EnginePool::initialize(&config.engine).await?);
//!     let context = ScoutContext::new(config, pool);
//!     let investigator = context.investigator();
//!     let outcome = investigator.scan("r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 3 3").await;
//!     println!("{}", serde_json::to_string_pretty(&outcome)?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration management for engines, scans, the store, and logging.
pub mod config;
/// Engine subprocess client, request queue, and pool.
pub mod engine;
/// Error types and result aliases for the application.
pub mod error;
/// Dual-depth investigation, goal search, evidence, and confidence.
pub mod scout;
/// Session-keyed board tree cache with TTL eviction.
pub mod store;

pub use config::Config;
pub use engine::{EnginePool, EngineQueue};
pub use error::{AppError, AppResult, EngineError, EngineResult};
pub use scout::{
    GoalRequest, InvestigationResult, Investigator, Predicate, ScanOutcome, ScanPolicy,
};
pub use store::{BoardTree, BoardTreeStore};

use std::sync::Arc;

/// Explicit application context: every component reachable from one value
/// constructed at process start and passed by reference. No module-level
/// singletons, so tests isolate by building fresh instances.
pub struct ScoutContext {
    /// Application configuration.
    pub config: Config,
    /// Shared engine pool.
    pub pool: Arc<EnginePool>,
    /// Session-keyed tree cache.
    pub store: BoardTreeStore,
}

impl ScoutContext {
    /// Assemble the context from an initialized pool.
    pub fn new(config: Config, pool: Arc<EnginePool>) -> Self {
        let store = BoardTreeStore::from_config(&config.store);
        Self {
            config,
            pool,
            store,
        }
    }

    /// An investigator bound to this context's pool and scan defaults.
    pub fn investigator(&self) -> Investigator {
        Investigator::new(Arc::clone(&self.pool), ScanPolicy::from(&self.config.scan))
    }
}
