//! Error types shared by the machine-type tooling
//!
//! Errors carry enough context (field paths, operation names) to be
//! actionable from a log line alone.

use thiserror::Error;

/// Main error type for shared operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid configuration or object content
    #[error("validation error for {field}: {message}")]
    Validation {
        /// The offending field or setting (e.g., "MACHINE_TYPE")
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "create_client", "restart")
        context: String,
    },
}

impl Error {
    /// Create a validation error for a named field
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }
}
