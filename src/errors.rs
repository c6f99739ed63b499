//! Error types for the resource pool

use std::time::Duration;

use thiserror::Error;

/// Error type produced by pluggable collaborators (factories and validators)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Could not borrow an entry within {0:?}")]
    Timeout(Duration),

    #[error("Failed to create a pooled object")]
    CreationFailed(#[source] BoxError),

    #[error("Pool entry failed validation")]
    ValidationFailed(#[source] Option<BoxError>),

    #[error("Background task is already scheduled")]
    AlreadyScheduled,

    #[error("Waiting for a pool entry was interrupted")]
    Interrupted,

    #[error("Pool is closed")]
    Closed,

    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to start background thread")]
    ThreadSpawn(#[source] std::io::Error),
}

impl PoolError {
    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::Timeout(_) | PoolError::CreationFailed(_) | PoolError::ValidationFailed(_)
        )
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_creation_failure_keeps_cause() {
        let err = PoolError::CreationFailed("connection refused".into());
        assert_eq!(err.to_string(), "Failed to create a pooled object");
        assert_eq!(err.source().unwrap().to_string(), "connection refused");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_validation_failure_without_cause() {
        let err = PoolError::ValidationFailed(None);
        assert!(err.source().is_none());
        assert!(!PoolError::Closed.is_retryable());
    }
}
