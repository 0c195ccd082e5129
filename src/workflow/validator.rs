//! Registration Validation
//!
//! Setup-time checks for jobs, services and event keys. Everything here
//! runs before the worker starts, so invalid registrations fail fast
//! instead of surfacing at dispatch time.

use std::collections::HashSet;

use log::debug;

use super::step::StepHandler;

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyJobName,
    EmptyJob,
    EmptyStepName,
    DuplicateStepName(String),
    EmptyServiceName,
    EmptyEventKey,
    PaddedEventKey(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyJobName => write!(f, "Job has empty or whitespace-only name"),
            Self::EmptyJob => write!(f, "Job has no steps"),
            Self::EmptyStepName => write!(f, "Step has empty or whitespace-only name"),
            Self::DuplicateStepName(name) => write!(f, "Duplicate step name: '{}'", name),
            Self::EmptyServiceName => write!(f, "Service has empty or whitespace-only name"),
            Self::EmptyEventKey => write!(f, "Event key is empty"),
            Self::PaddedEventKey(key) => {
                write!(f, "Event key '{}' has leading or trailing whitespace", key)
            }
        }
    }
}

/// Validates a job's name and step list.
///
/// Checks that:
/// 1. The job name is not blank
/// 2. There is at least one step
/// 3. Every step has a non-blank name
/// 4. Step names are unique within the job
pub fn validate_job(name: &str, steps: &[StepHandler]) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyJobName);
    }

    if steps.is_empty() {
        return Err(ValidationError::EmptyJob);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for step in steps {
        if step.name().trim().is_empty() {
            return Err(ValidationError::EmptyStepName);
        }
        if !seen.insert(step.name()) {
            return Err(ValidationError::DuplicateStepName(step.name().to_string()));
        }
    }

    debug!("Job '{}' validated with {} steps", name, steps.len());
    Ok(())
}

/// Validates a service name.
pub fn validate_service_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyServiceName);
    }
    Ok(())
}

/// Validates an event key.
///
/// Keys are matched by exact string comparison, so surrounding
/// whitespace would make a binding unreachable.
pub fn validate_event_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::EmptyEventKey);
    }
    if key.trim() != key {
        return Err(ValidationError::PaddedEventKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::context::Context;
    use crate::workflow::step::BoxError;

    fn step(name: &str) -> StepHandler {
        StepHandler::new(name, |_ctx: Context, n: u32| async move { Ok::<_, BoxError>(n) })
    }

    #[test]
    fn test_valid_job() {
        assert!(validate_job("job", &[step("a"), step("b")]).is_ok());
    }

    #[test]
    fn test_empty_job_name() {
        assert_eq!(
            validate_job("  ", &[step("a")]),
            Err(ValidationError::EmptyJobName)
        );
    }

    #[test]
    fn test_no_steps() {
        assert_eq!(validate_job("job", &[]), Err(ValidationError::EmptyJob));
    }

    #[test]
    fn test_duplicate_step_names() {
        assert_eq!(
            validate_job("job", &[step("a"), step("a")]),
            Err(ValidationError::DuplicateStepName("a".to_string()))
        );
    }

    #[test]
    fn test_blank_step_name() {
        assert_eq!(
            validate_job("job", &[step(" ")]),
            Err(ValidationError::EmptyStepName)
        );
    }

    #[test]
    fn test_event_keys() {
        assert!(validate_event_key("user:create:middleware").is_ok());
        assert_eq!(validate_event_key(""), Err(ValidationError::EmptyEventKey));
        assert!(matches!(
            validate_event_key(" user:create"),
            Err(ValidationError::PaddedEventKey(_))
        ));
    }

    #[test]
    fn test_service_name() {
        assert!(validate_service_name("test").is_ok());
        assert_eq!(
            validate_service_name(""),
            Err(ValidationError::EmptyServiceName)
        );
    }

    #[test]
    fn test_error_display() {
        let err = ValidationError::DuplicateStepName("step-one".to_string());
        assert_eq!(err.to_string(), "Duplicate step name: 'step-one'");
    }
}
