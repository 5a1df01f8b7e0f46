//! Job-specific error types

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("missing namespace on VirtualMachine {0}")]
    MissingNamespace(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to build request for {operation}: {message}")]
    Request { operation: String, message: String },
}

impl JobError {
    /// Configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
