use std::time::Duration;
use thiserror::Error;

/// Main error type for servicemodel
#[derive(Error, Debug, Clone)]
pub enum ServiceModelError {
    /// Transport-level communication failure
    #[error("Communication error: {0}")]
    Communication(String),

    /// The communication object faulted and can no longer be used
    #[error("Communication object faulted: {0}")]
    Faulted(String),

    /// The object was closed or aborted before the call
    #[error("Object disposed: {0}")]
    ObjectDisposed(String),

    /// Operation exceeded its caller-supplied timeout
    #[error("Operation '{operation}' timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    /// Missing or invalid endpoint configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A required argument was not supplied
    #[error("Required argument '{0}' is missing")]
    ArgumentMissing(&'static str),

    /// Call is not valid for the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

impl ServiceModelError {
    /// Build a timeout error for a named operation
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Errors that may succeed when retried against a fresh channel factory
    ///
    /// Covers the communication, disposed and timeout classes. `Faulted` is a
    /// communication failure of the object itself and is classified with them.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Communication(_) | Self::Faulted(_) | Self::ObjectDisposed(_) | Self::Timeout { .. }
        )
    }

    /// Errors caused by misconfiguration; retrying never helps
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::ArgumentMissing(_))
    }
}

/// Result type for servicemodel operations
pub type Result<T> = std::result::Result<T, ServiceModelError>;
