//! Error handling for rotaslice
//!
//! Provides error types for all layers of the slicing backend:
//! - Engine errors (subprocess spawn, exit and I/O)
//! - Synthesis errors (toolpath generation)
//! - Pipeline errors (stage orchestration)
//!
//! Pre-flight validation failures are not errors in this sense: they are
//! reported as [`ResultCode`](crate::ResultCode)s by the pipeline stage that
//! detects them. All error types use `thiserror`.

use thiserror::Error;

/// External engine error type
///
/// Represents failures of the engine subprocess boundary. Spawn failures
/// are fatal for the run and are never retried.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Engine executable does not exist
    #[error("Engine executable not found: {path}")]
    NotFound {
        /// The executable path that was looked up.
        path: String,
    },

    /// Engine executable exists but may not be executed
    #[error("Permission denied launching engine {path}")]
    PermissionDenied {
        /// The executable path.
        path: String,
    },

    /// Any other spawn failure
    #[error("Failed to spawn engine {path}: {reason}")]
    Spawn {
        /// The executable path.
        path: String,
        /// The reason reported by the operating system.
        reason: String,
    },

    /// Engine exited unsuccessfully
    #[error("Engine exited with status {code:?}")]
    Exited {
        /// The exit code, `None` when terminated by a signal.
        code: Option<i32>,
    },

    /// Engine ran longer than the configured limit
    #[error("Engine timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Engine finished but produced no output file
    #[error("Engine output missing: {path}")]
    MissingOutput {
        /// The expected output path.
        path: String,
    },

    /// I/O failure while talking to the engine
    #[error("Engine I/O error: {reason}")]
    Io {
        /// The reason for the I/O error.
        reason: String,
    },
}

impl EngineError {
    /// Check if this error happened while launching the executable
    pub fn is_spawn_error(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. }
                | EngineError::PermissionDenied { .. }
                | EngineError::Spawn { .. }
        )
    }

    /// Classify an I/O error raised by process creation
    pub fn from_spawn_io(path: impl Into<String>, err: &std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => EngineError::NotFound { path },
            std::io::ErrorKind::PermissionDenied => EngineError::PermissionDenied { path },
            _ => EngineError::Spawn {
                path,
                reason: err.to_string(),
            },
        }
    }
}

/// Toolpath synthesis error type
#[derive(Error, Debug, Clone)]
pub enum SynthesisError {
    /// The run was cancelled through its cancel token
    #[error("Synthesis cancelled")]
    Cancelled,

    /// Reading the intermediate stream failed
    #[error("Failed to read geometry stream: {reason}")]
    Io {
        /// The reason for the I/O error.
        reason: String,
    },

    /// Synthesis parameters are unusable
    #[error("Invalid synthesis parameter '{key}': {reason}")]
    InvalidParameter {
        /// The offending setting key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Pipeline orchestration error type
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// A stage task panicked or was aborted
    #[error("Stage {stage} aborted: {reason}")]
    StageAborted {
        /// The stage name.
        stage: String,
        /// The join failure description.
        reason: String,
    },

    /// Writing the request or reading results failed
    #[error("Work directory error: {reason}")]
    WorkDir {
        /// The reason for the failure.
        reason: String,
    },

    /// The backend controller is no longer running
    #[error("Backend controller has shut down")]
    ControllerGone,
}

/// Main error type for rotaslice
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Engine error
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Synthesis error
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// Pipeline error
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Configuration could not be loaded or validated
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this error is a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Synthesis(SynthesisError::Cancelled))
    }

    /// Check if this is an engine spawn failure
    pub fn is_spawn_error(&self) -> bool {
        matches!(self, Error::Engine(e) if e.is_spawn_error())
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_io_classification() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let engine = EngineError::from_spawn_io("/opt/engine", &err);
        assert!(matches!(engine, EngineError::NotFound { .. }));
        assert!(engine.is_spawn_error());

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let engine = EngineError::from_spawn_io("/opt/engine", &err);
        assert!(matches!(engine, EngineError::PermissionDenied { .. }));

        let err = std::io::Error::other("weird");
        let engine = EngineError::from_spawn_io("/opt/engine", &err);
        assert_eq!(
            engine.to_string(),
            "Failed to spawn engine /opt/engine: weird"
        );
    }

    #[test]
    fn test_exit_is_not_spawn_error() {
        let err: Error = EngineError::Exited { code: Some(3) }.into();
        assert!(!err.is_spawn_error());
        assert_eq!(err.to_string(), "Engine exited with status Some(3)");
    }

    #[test]
    fn test_cancelled_predicate() {
        let err: Error = SynthesisError::Cancelled.into();
        assert!(err.is_cancelled());
        assert!(!Error::other("x").is_cancelled());
    }
}
