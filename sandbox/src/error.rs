use std::time::Duration;

use thiserror::Error;

use crate::host_value::HostValue;

/// Failures that abort one `execute` call.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("cannot initialize interpreter: {0}")]
    Initialization(String),

    #[error("cannot install bridge function `{name}`: {message}")]
    BridgeInstall { name: String, message: String },

    /// The guest program threw during evaluation (syntax or runtime error).
    #[error("{0}")]
    GuestEvaluation(String),

    #[error("guest code did not finish within {0:?}")]
    Timeout(Duration),
}

impl SandboxError {
    pub fn is_guest_error(&self) -> bool {
        matches!(self, SandboxError::GuestEvaluation(_))
    }
}

/// Host verification logic rejected a bridge call.
/// Isolated to that call: it is logged and never aborts `execute`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerificationError {
    #[error("verification failed: {0}")]
    Failed(String),

    #[error("expected {expected}, got {actual}")]
    Mismatch {
        expected: HostValue,
        actual: HostValue,
    },
}

impl VerificationError {
    pub fn failed(message: impl Into<String>) -> Self {
        VerificationError::Failed(message.into())
    }
}
