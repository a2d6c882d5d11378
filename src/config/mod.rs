use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    pub scan: ScanConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Engine subprocess configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the UCI engine binary.
    pub binary: PathBuf,
    /// Number of independent engine processes in the pool.
    pub pool_size: usize,
    /// Deadline for a single engine call.
    pub call_timeout_ms: u64,
    /// Bound on queued-but-unserved requests per instance.
    pub queue_capacity: usize,
}

/// Default knobs for dual-depth scans
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub shallow_depth: u32,
    pub deep_depth: u32,
    pub branching_limit: usize,
    pub max_pv_plies: usize,
    pub transcript_max_chars: usize,
    pub timeout_seconds: f64,
    pub overestimate_threshold_cp: i32,
}

/// Board tree store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Time since last access after which a cached tree is evicted.
    pub ttl: Duration,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let engine = EngineConfig {
            binary: PathBuf::from(
                env::var("ENGINE_BINARY").unwrap_or_else(|_| "stockfish".to_string()),
            ),
            pool_size: env_parse("ENGINE_POOL_SIZE", 2),
            call_timeout_ms: env_parse("ENGINE_CALL_TIMEOUT_MS", 60_000),
            queue_capacity: env_parse("ENGINE_QUEUE_CAPACITY", 64),
        };

        if engine.pool_size == 0 {
            return Err(AppError::Config {
                message: "ENGINE_POOL_SIZE must be at least 1".to_string(),
            });
        }

        let scan = ScanConfig {
            shallow_depth: env_parse("SCAN_SHALLOW_DEPTH", 2),
            deep_depth: env_parse("SCAN_DEEP_DEPTH", 16),
            branching_limit: env_parse("SCAN_BRANCHING_LIMIT", 4),
            max_pv_plies: env_parse("SCAN_MAX_PV_PLIES", 16),
            transcript_max_chars: env_parse("SCAN_TRANSCRIPT_MAX_CHARS", 12_000),
            timeout_seconds: env_parse("SCAN_TIMEOUT_SECONDS", 18.0),
            overestimate_threshold_cp: env_parse("SCAN_OVERESTIMATE_THRESHOLD_CP", 80),
        };

        let store = StoreConfig {
            ttl: Duration::from_secs(env_parse("STORE_TTL_SECONDS", 1800)),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config {
            engine,
            scan,
            store,
            logging,
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("stockfish"),
            pool_size: 2,
            call_timeout_ms: 60_000,
            queue_capacity: 64,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            shallow_depth: 2,
            deep_depth: 16,
            branching_limit: 4,
            max_pv_plies: 16,
            transcript_max_chars: 12_000,
            timeout_seconds: 18.0,
            overestimate_threshold_cp: 80,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(1800),
        }
    }
}
