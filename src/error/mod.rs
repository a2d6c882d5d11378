use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Malformed position: {fen}")]
    MalformedPosition { fen: String },

    #[error("Illegal move {mv} in position {fen}")]
    IllegalMove { mv: String, fen: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Engine process and protocol errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("Engine call timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Protocol violation: {message}")]
    Protocol { message: String },

    #[error("Engine process terminated: {message}")]
    ProcessDied { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether a retry could plausibly succeed. Protocol violations and
    /// process death require a fresh instance; timeouts and transient
    /// unavailability do not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Unavailable { .. } | EngineError::Timeout { .. }
        )
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::MalformedPosition {
            fen: "not a fen".to_string(),
        };
        assert_eq!(err.to_string(), "Malformed position: not a fen");

        let err = AppError::IllegalMove {
            mv: "e2e5".to_string(),
            fen: "startpos".to_string(),
        };
        assert_eq!(err.to_string(), "Illegal move e2e5 in position startpos");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::Unavailable {
            message: "spawn failed".to_string(),
            retries: 3,
        };
        assert_eq!(
            err.to_string(),
            "Engine unavailable: spawn failed (retries: 3)"
        );

        let err = EngineError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Engine call timeout after 5000ms");

        let err = EngineError::Protocol {
            message: "no bestmove".to_string(),
        };
        assert_eq!(err.to_string(), "Protocol violation: no bestmove");

        let err = EngineError::ProcessDied {
            message: "stdout closed".to_string(),
        };
        assert_eq!(err.to_string(), "Engine process terminated: stdout closed");
    }

    #[test]
    fn test_engine_error_conversion_to_app_error() {
        let engine_err = EngineError::Timeout { timeout_ms: 1000 };
        let app_err: AppError = engine_err.into();
        assert!(matches!(app_err, AppError::Engine(_)));
        assert!(app_err.to_string().contains("timeout"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::Timeout { timeout_ms: 1 }.is_transient());
        assert!(EngineError::Unavailable {
            message: "busy".to_string(),
            retries: 0,
        }
        .is_transient());
        assert!(!EngineError::Protocol {
            message: "garbage".to_string(),
        }
        .is_transient());
        assert!(!EngineError::ProcessDied {
            message: "killed".to_string(),
        }
        .is_transient());
    }
}
