use std::path::PathBuf;

use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong.
        message: String,
    },

    /// Rejected thought submission.
    #[error(transparent)]
    Thought(#[from] ThoughtError),

    /// Session store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Protocol failure.
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// Unexpected internal failure.
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

/// Errors raised while constructing or validating a thought record.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ThoughtError {
    /// A field failed validation.
    #[error("Validation failed: {field} - {reason}")]
    Validation {
        /// Offending field, in its wire name.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The stage name matched no known stage.
    #[error("Invalid thinking stage: '{value}'. Valid stages are: {valid}")]
    InvalidStage {
        /// Name as submitted.
        value: String,
        /// Comma-separated list of accepted names.
        valid: String,
    },
}

impl ThoughtError {
    /// Shorthand for a field validation failure.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ThoughtError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// The advisory lock was not acquired in time.
    #[error("Timed out after {timeout_ms}ms waiting for lock on {}", .path.display())]
    LockTimeout {
        /// Lock file.
        path: PathBuf,
        /// How long we waited.
        timeout_ms: u64,
    },

    /// Filesystem failure.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Encoding failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A file to import did not hold a valid session.
    #[error("Invalid session data in {}: {reason}", .path.display())]
    InvalidSession {
        /// File read.
        path: PathBuf,
        /// First problem found.
        reason: String,
    },

    /// A blocking storage task panicked or was cancelled.
    #[error("Storage task failed: {message}")]
    Task {
        /// Join error text.
        message: String,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    /// Malformed request.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// What was wrong.
        message: String,
    },

    /// No tool with that name.
    #[error("Unknown tool: {tool_name}")]
    UnknownTool {
        /// Name requested.
        tool_name: String,
    },

    /// Arguments did not match the tool's schema.
    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters {
        /// Tool called.
        tool_name: String,
        /// Deserialization error text.
        message: String,
    },

    /// The tool ran and failed.
    #[error("Tool execution failed: {message}")]
    ExecutionFailed {
        /// Failure text shown to the client.
        message: String,
    },

    /// Encoding failure.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for thought construction
pub type ThoughtResult<T> = Result<T, ThoughtError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;
