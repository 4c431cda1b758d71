//! Error types for gmg.

use std::path::PathBuf;

/// Result type alias using the gmg [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error type for gmg.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid module id {id}: {reason}")]
    InvalidModuleId { id: String, reason: String },

    #[error("command failed: {command}{}", exit_context(.exit_code, .stderr))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("inconsistent graph: {0}")]
    Inconsistent(String),

    #[error("operation canceled")]
    Canceled,

    #[error("no selection satisfies the requirements (SAT status: unsat)")]
    Unsatisfiable,
}

fn exit_context(exit_code: &Option<i32>, stderr: &str) -> String {
    let mut out = String::new();
    if let Some(code) = exit_code {
        out.push_str(&format!(" (exit code {code})"));
    }
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        out.push_str(&format!(": {stderr}"));
    }
    out
}

impl Error {
    /// Create an invalid-module-id error.
    pub fn invalid_id(id: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Error::InvalidModuleId {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse(message.into())
    }

    /// Create a graph-inconsistency error.
    pub fn inconsistent(message: impl Into<String>) -> Self {
        Error::Inconsistent(message.into())
    }

    /// Create an I/O error with a path for context.
    pub fn io_at(message: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            message: message.into(),
            path: Some(path.into()),
            source,
        }
    }

    /// Whether this error is a cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }
}
