use thiserror::Error;

/// Typed error hierarchy for the orchestration core.
///
/// Use at module boundaries (provider calls, tool execution, cron store,
/// subagent manager). Internal/leaf functions continue using `anyhow::Result`;
/// the `Internal` variant allows seamless conversion via `?`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {message}")]
    Provider { message: String, retryable: bool },

    #[error("Rate limit exceeded")]
    RateLimit { retry_after: Option<u64> },

    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Attempting to spawn a subagent beyond `max_concurrent`.
    #[error("Concurrency limit reached: {running}/{max} subagents already running")]
    LimitReached { running: usize, max: usize },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    /// Whether this error is transient and the operation should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::RateLimit { .. } | Self::Internal(_) => true,
            Self::Auth(_) | Self::Config(_) | Self::LimitReached { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_rate_limit() {
        let err = CoreError::RateLimit {
            retry_after: Some(5),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn non_retryable_config() {
        let err = CoreError::Config("bad".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn limit_reached_not_retryable() {
        let err = CoreError::LimitReached {
            running: 10,
            max: 10,
        };
        assert!(!err.is_retryable());
    }
}
