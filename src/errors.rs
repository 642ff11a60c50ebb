//! Error types for Symphony
//!
//! One error enum for the whole orchestration core. Variants follow the
//! failure taxonomy of the engine: decomposition failures are fatal for the
//! top-level task, executor failures are isolated per subtask, learning
//! failures are recoverable.

use thiserror::Error;

/// Main error type for the orchestration engine
#[derive(Error, Debug)]
pub enum SymphonyError {
    /// Text-generation backend failed while decomposing a task
    #[error("Decomposition failed: {0}")]
    Decomposition(String),

    /// Text-generation backend did not answer in time
    #[error("Decomposition timed out after {duration_ms}ms")]
    DecompositionTimeout { duration_ms: u64 },

    /// Task rejected before any work started
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// Lifecycle transition errors (task status or orchestration state)
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// Executor returned an error for a subtask
    #[error("Executor '{capability}' failed: {reason}")]
    ExecutorFailure { capability: String, reason: String },

    /// Executor did not finish within the subtask timeout
    #[error("Executor timed out after {duration_ms}ms")]
    ExecutorTimeout { duration_ms: u64 },

    /// A single learning mechanism could not apply an update
    #[error("Learning update '{mechanism}' failed: {reason}")]
    LearningUpdate { mechanism: String, reason: String },

    /// Decision outcomes are written exactly once
    #[error("Decision {0} already has an outcome")]
    DecisionAlreadyResolved(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Transient text-generation backend errors
    #[error("Text backend error: {0}")]
    TextBackend(String),

    /// Audit sink errors
    #[error("Audit error: {0}")]
    Audit(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic errors with context
    #[error("Symphony error: {0}")]
    Generic(String),
}

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, SymphonyError>;

impl SymphonyError {
    /// Errors that may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SymphonyError::TextBackend(_)
                | SymphonyError::HttpError(_)
                | SymphonyError::DecompositionTimeout { .. }
        )
    }
}

/// Convert anyhow errors to SymphonyError
impl From<anyhow::Error> for SymphonyError {
    fn from(err: anyhow::Error) -> Self {
        SymphonyError::Generic(err.to_string())
    }
}
