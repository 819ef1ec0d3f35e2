use std::thread::ThreadId;
use thiserror::Error;

/// Embedded runtime error types
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Runtime initialization failed: {reason}")]
    InitializationFailure { reason: String },

    #[error("Invalid argument `{argument}`: {reason}")]
    InvalidArgument { argument: &'static str, reason: String },

    #[error("Cannot find a subclass of {base} in module {module}")]
    NotFound { base: String, module: String },

    #[error(
        "Thread affinity violation: lock acquired on {acquired_on:?} \
         but released on {released_on:?}"
    )]
    ThreadAffinityViolation {
        acquired_on: ThreadId,
        released_on: ThreadId,
    },

    #[error("Runtime is not initialized")]
    NotInitialized,

    #[error("Runtime has already been finalized")]
    AlreadyFinalized,

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("'{owner}' has no attribute '{name}'")]
    AttributeError { owner: String, name: String },

    #[error("No module named '{0}'")]
    ModuleNotFound(String),

    #[error("Capability error: {0}")]
    Capability(String),

    #[error("Critical section task failed: {0}")]
    TaskFailed(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

impl RuntimeError {
    pub fn init_failure(reason: impl Into<String>) -> Self {
        Self::InitializationFailure {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(argument: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            reason: reason.into(),
        }
    }

    /// Boot failures and lock-affinity breaches leave the shared runtime in
    /// a state nothing should keep using.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RuntimeError::InitializationFailure { .. }
                | RuntimeError::ThreadAffinityViolation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(RuntimeError::init_failure("boom").is_fatal());
        assert!(!RuntimeError::invalid_argument("base", "not a type").is_fatal());
        assert!(!RuntimeError::NotFound {
            base: "Base".into(),
            module: "m".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_invalid_argument_names_argument() {
        let err = RuntimeError::invalid_argument("module", "42 is not a module object");
        assert_eq!(err.to_string(), "Invalid argument `module`: 42 is not a module object");
    }
}
