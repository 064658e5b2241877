//! Unified error types for Wave-Orch

use thiserror::Error;

/// A strict report validation failure, tagged with the offending field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid report field `{field}`: {message}")]
pub struct ValidationError {
    /// JSON field name that failed validation (e.g. `needs_human_reason`)
    pub field: String,
    /// Human-readable description of the violation
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Unified error type for all Wave-Orch operations
#[derive(Error, Debug)]
pub enum OrchError {
    // Submission rejections
    #[error("engine is paused")]
    Paused,

    #[error("task queue full")]
    QueueFull,

    // State machine
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // Report protocol
    #[error("malformed report block: {0}")]
    ReportDecode(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    // Agent errors
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent execution failed: {0}")]
    Execution(String),

    // Worker pool lifecycle
    #[error("engine workers already started")]
    AlreadyStarted,

    #[error("engine is shut down")]
    Shutdown,

    // Configuration
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using OrchError
pub type Result<T> = std::result::Result<T, OrchError>;
