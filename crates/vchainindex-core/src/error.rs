//! Error types for the vchainindex pipeline.

use thiserror::Error;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Handler error in '{handler}': {reason}")]
    Handler { handler: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if another attempt may succeed.
    ///
    /// Configuration problems never go away on their own.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }

    /// Shorthand for a [`IndexerError::Handler`] error.
    pub fn handler(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handler {
            handler: handler.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(IndexerError::Fetch("timeout".into()).is_retryable());
        assert!(IndexerError::Storage("locked".into()).is_retryable());
        assert!(IndexerError::handler("sink", "boom").is_retryable());
        assert!(!IndexerError::Config("empty id".into()).is_retryable());
    }

    #[test]
    fn handler_error_display() {
        let err = IndexerError::handler("sink", "disk full");
        assert_eq!(err.to_string(), "Handler error in 'sink': disk full");
    }
}
