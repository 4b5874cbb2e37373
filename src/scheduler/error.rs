//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// State store operation failed
    StateStore {
        operation: String,
        reason: String,
    },

    /// Stored value could not be interpreted
    InvalidState {
        key: String,
        value: String,
    },

    /// Trigger configuration error
    TriggerConfigError {
        field: String,
        reason: String,
    },

    /// A cycle aborted before completing its source loop
    CycleFailed {
        reason: String,
    },

    /// The cycle task panicked
    CyclePanicked,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateStore { operation, reason } => {
                write!(f, "State store error during '{}': {}", operation, reason)
            }
            Self::InvalidState { key, value } => {
                write!(f, "Invalid value '{}' stored under '{}'", value, key)
            }
            Self::TriggerConfigError { field, reason } => {
                write!(f, "Trigger config error in '{}': {}", field, reason)
            }
            Self::CycleFailed { reason } => {
                write!(f, "Cycle failed: {}", reason)
            }
            Self::CyclePanicked => write!(f, "Cycle panicked"),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<rusqlite::Error> for SchedulerError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StateStore {
            operation: "sqlite".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for SchedulerError {
    fn from(err: redis::RedisError) -> Self {
        Self::StateStore {
            operation: "redis".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<deadpool_redis::PoolError> for SchedulerError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::StateStore {
            operation: "redis pool".to_string(),
            reason: err.to_string(),
        }
    }
}

impl SchedulerError {
    /// Create a state store error
    pub fn state_store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StateStore {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidState {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a trigger config error
    pub fn trigger_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TriggerConfigError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a cycle failure
    pub fn cycle_failed(reason: impl Into<String>) -> Self {
        Self::CycleFailed {
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StateStore { .. } | Self::CycleFailed { .. } | Self::CyclePanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_store_error_display() {
        let err = SchedulerError::state_store("acquire lock", "connection refused");
        assert_eq!(
            err.to_string(),
            "State store error during 'acquire lock': connection refused"
        );
    }

    #[test]
    fn test_is_recoverable() {
        assert!(SchedulerError::state_store("get", "timeout").is_recoverable());
        assert!(SchedulerError::CyclePanicked.is_recoverable());
        assert!(!SchedulerError::trigger_config("poll_interval", "zero").is_recoverable());
        assert!(!SchedulerError::invalid_state("next_run", "soon").is_recoverable());
    }

    #[test]
    fn test_from_rusqlite_error() {
        let err: SchedulerError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, SchedulerError::StateStore { .. }));
    }
}
