// ctxflow error handling framework
// Central location for error types, codes, and handling utilities

use std::fmt;
use thiserror::Error;

// Re-export common error handling tools for convenience
pub use anyhow;
pub use thiserror;

/// Error code structure for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ErrorCode(pub u32);

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// Executor-specific error codes
pub mod codes {
    use crate::ErrorCode;

    // Executor error codes start with 1000
    pub const REJECTED_EXECUTION: ErrorCode = ErrorCode(1001);
    pub const TASK_PANICKED: ErrorCode = ErrorCode(1002);
    pub const CANCELLED: ErrorCode = ErrorCode(1003);
    pub const DEADLINE_EXCEEDED: ErrorCode = ErrorCode(1004);
    pub const NO_TASK_SUCCEEDED: ErrorCode = ErrorCode(1005);
    pub const DISCONNECTED: ErrorCode = ErrorCode(1006);
}

/// Errors surfaced through task result handles and submission calls
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// Task submitted after the executor began shutting down
    #[error("Execution rejected: {0}")]
    RejectedExecution(String),

    /// The task panicked while running
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// The task was cancelled before it produced a result
    #[error("Task cancelled")]
    Cancelled,

    /// A bounded wait elapsed before a result was available
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Every task in a race failed or was cancelled
    #[error("No task succeeded: {0}")]
    NoTaskSucceeded(String),

    /// The result channel closed before a value was produced
    #[error("Result channel disconnected: {0}")]
    Disconnected(String),
}

impl ExecutorError {
    /// Stable code for this error, for logging and serialization
    pub fn code(&self) -> ErrorCode {
        use codes::*;
        match self {
            ExecutorError::RejectedExecution(_) => REJECTED_EXECUTION,
            ExecutorError::TaskPanicked(_) => TASK_PANICKED,
            ExecutorError::Cancelled => CANCELLED,
            ExecutorError::DeadlineExceeded(_) => DEADLINE_EXCEEDED,
            ExecutorError::NoTaskSucceeded(_) => NO_TASK_SUCCEEDED,
            ExecutorError::Disconnected(_) => DISCONNECTED,
        }
    }

    /// Create a new rejected execution error
    pub fn rejected(message: impl Into<String>) -> Self {
        ExecutorError::RejectedExecution(message.into())
    }

    /// Create a new task panicked error
    pub fn panicked(message: impl Into<String>) -> Self {
        ExecutorError::TaskPanicked(message.into())
    }

    /// Create a new deadline exceeded error
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        ExecutorError::DeadlineExceeded(message.into())
    }

    /// Convert into the serializable message envelope
    pub fn to_message(&self) -> ErrorMessage {
        ErrorMessage {
            code: self.code(),
            message: self.to_string(),
            details: None,
        }
    }
}

/// Standard error message format for serialization
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Convenient Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;
