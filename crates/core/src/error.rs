use std::time::Duration;

use thiserror::Error;

/// Errors raised by provider collaborators and resource handling.
#[derive(Error, Debug)]
pub enum PowerMgmtError {
    /// The provider rejected the call because another operation is running
    /// against the same resource.
    #[error("another operation is in progress on {0}")]
    OperationInProgress(String),

    /// The provider throttled a (usually paged listing) request.
    #[error("request throttled by provider: {message}")]
    Throttled {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("invalid resource id: {0}")]
    InvalidResourceId(String),

    #[error("unsupported resource type {0}")]
    UnsupportedResourceType(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl PowerMgmtError {
    /// Whether the call layer should retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PowerMgmtError::OperationInProgress(_) | PowerMgmtError::Throttled { .. }
        )
    }

    /// Provider-supplied backoff, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PowerMgmtError::Throttled { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PowerMgmtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_and_throttling_are_retryable() {
        assert!(PowerMgmtError::OperationInProgress("vm1".into()).is_retryable());
        assert!(PowerMgmtError::Throttled {
            message: "slow down".into(),
            retry_after: None,
        }
        .is_retryable());
        assert!(!PowerMgmtError::NotFound("vm1".into()).is_retryable());
        assert!(!PowerMgmtError::Provider("boom".into()).is_retryable());
    }

    #[test]
    fn retry_after_only_for_throttling() {
        let throttled = PowerMgmtError::Throttled {
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(throttled.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(
            PowerMgmtError::OperationInProgress("x".into()).retry_after(),
            None
        );
    }
}
