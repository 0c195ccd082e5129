//! Error Types
//!
//! A single error enum shared by registration, dispatch and step execution.
//! It is `Clone` so a run's failure can be stored by the worker and handed
//! to observers at the same time.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the event runner.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    /// A service with this name is already registered on the worker
    #[error("service '{0}' is already registered")]
    DuplicateService(String),

    /// Service name is empty or whitespace-only
    #[error("invalid service name '{0}'")]
    InvalidService(String),

    /// A job with this name is already registered on the service
    #[error("job '{job}' is already registered on service '{service}'")]
    DuplicateJob { service: String, job: String },

    /// Job definition failed validation
    #[error("invalid workflow job '{job}': {reason}")]
    InvalidJob { job: String, reason: String },

    /// Requested context key is absent
    #[error("context value '{0}' is not set")]
    MissingContextValue(String),

    /// Context key holds a value of another type
    #[error("context value '{key}' is not of type {expected}")]
    ContextTypeMismatch { key: String, expected: &'static str },

    /// Event payload could not be decoded into the first step's input type
    #[error("step '{step}' could not decode its input as {expected}: {reason}")]
    InputDecode {
        step: String,
        expected: &'static str,
        reason: String,
    },

    /// A value could not be serialised
    #[error("failed to encode value: {0}")]
    Encode(String),

    /// A step handler returned an error
    #[error("step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    /// Downstream chain did not finish in time
    #[error("run timed out after {0:?}")]
    Timeout(Duration),

    /// Error raised by a middleware itself
    #[error("middleware error: {0}")]
    Middleware(String),

    /// The task executing a run panicked
    #[error("run panicked: {0}")]
    RunPanicked(String),

    /// Worker no longer accepts events
    #[error("worker is not accepting events")]
    WorkerStopped,

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failed_display() {
        let err = WorkflowError::StepFailed {
            step: "step-one".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "step 'step-one' failed: boom");
    }

    #[test]
    fn test_context_mismatch_display() {
        let err = WorkflowError::ContextTypeMismatch {
            key: "testkey".to_string(),
            expected: "u32",
        };
        assert!(err.to_string().contains("testkey"));
        assert!(err.to_string().contains("u32"));
    }

    #[test]
    fn test_errors_are_comparable() {
        assert_eq!(WorkflowError::WorkerStopped, WorkflowError::WorkerStopped);
        assert_ne!(
            WorkflowError::DuplicateService("a".to_string()),
            WorkflowError::DuplicateService("b".to_string())
        );
    }
}
