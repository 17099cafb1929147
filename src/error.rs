//! Error types for askdb.
//!
//! [`AgentError`] is the taxonomy the orchestrator classifies every failed
//! turn with. Lower layers (database drivers, object storage) have their
//! own error enums that are folded into it at the component boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::db::DbError;
pub use crate::export::StoreError;

/// Result alias for CLI-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by CLI commands.
#[derive(Debug, Error)]
pub enum Error {
    /// Agent or orchestration failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Command execution failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by CLI command handlers.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command failed during execution.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The command received invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors produced by the agent orchestration engine.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Required configuration is missing or invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// What is missing or wrong.
        message: String,
    },

    /// No model backend is registered.
    #[error(
        "no model backend configured: set OPENAI_API_KEY or ANTHROPIC_API_KEY before starting"
    )]
    NoBackend,

    /// The named provider family is not supported.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Requested provider name.
        name: String,
    },

    /// A database connection could not be opened or probed.
    #[error("connectivity error: {message}")]
    Connectivity {
        /// Driver or probe failure description.
        message: String,
    },

    /// Schema introspection failed.
    #[error("introspection failed: {message}")]
    Introspection {
        /// Failure description.
        message: String,
    },

    /// A tool was called with malformed or missing arguments.
    #[error("invalid arguments for {name}: {message}")]
    ToolArgument {
        /// Tool name.
        name: String,
        /// What was wrong with the arguments.
        message: String,
    },

    /// A tool failed while executing.
    #[error("{name} failed: {message}")]
    ToolExecution {
        /// Tool name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// Object storage upload failed after exhausting retries.
    #[error("upload failed after {attempts} attempts: {message}")]
    UploadFailure {
        /// Number of attempts made.
        attempts: u32,
        /// Aggregated per-attempt errors.
        message: String,
    },

    /// The reasoning loop hit its iteration cap.
    #[error("agent loop exceeded {max_iterations} iterations without a final answer")]
    LoopBoundExceeded {
        /// Configured cap.
        max_iterations: usize,
    },

    /// LLM API request failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Error description.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// The LLM response could not be interpreted.
    #[error("invalid model response: {message}")]
    ResponseParse {
        /// Error description.
        message: String,
    },

    /// An operation exceeded its time bound.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// What timed out.
        operation: String,
        /// Bound in seconds.
        seconds: u64,
    },

    /// The caller abandoned the turn.
    #[error("turn cancelled by caller")]
    Cancelled,
}

/// Serializable classification of a failed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing connection fields or no backend.
    Configuration,
    /// Database unreachable or probe failed.
    Connectivity,
    /// Schema listing unavailable under strict introspection.
    Introspection,
    /// Malformed tool arguments.
    ToolArgument,
    /// Tool failure.
    ToolExecution,
    /// Upload retries exhausted.
    UploadFailure,
    /// Too many reasoning iterations.
    LoopBoundExceeded,
    /// Backend (LLM) failure.
    Backend,
    /// Time bound exceeded.
    Timeout,
    /// Caller went away.
    Cancelled,
}

impl AgentError {
    /// Classifies this error for the turn result.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } | Self::NoBackend | Self::UnsupportedProvider { .. } => {
                ErrorKind::Configuration
            }
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::Introspection { .. } => ErrorKind::Introspection,
            Self::ToolArgument { .. } => ErrorKind::ToolArgument,
            Self::ToolExecution { .. } => ErrorKind::ToolExecution,
            Self::UploadFailure { .. } => ErrorKind::UploadFailure,
            Self::LoopBoundExceeded { .. } => ErrorKind::LoopBoundExceeded,
            Self::ApiRequest { .. } | Self::ResponseParse { .. } => ErrorKind::Backend,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Shorthand for a [`AgentError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
