//! Error types for dualrag-core
//!
//! Only construction-time failures and memory backend failures surface as
//! [`Error`]. Per-request stage failures are absorbed by the orchestrator.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing threshold, bad floor, etc.)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid configuration value
    #[error("invalid configuration `{field}`: {message}")]
    InvalidConfig {
        /// Config field name
        field: String,
        /// Detailed message
        message: String,
    },

    /// Memory backend error
    #[error("memory error: {0}")]
    Memory(String),

    /// Embedding failure (provider error, dimension mismatch)
    #[error("embedding error: {0}")]
    Embedding(String),

    /// LLM provider error
    #[error("llm error: {0}")]
    Llm(#[from] dualrag_llm::Error),

    /// Internal error (serialization, etc.)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for an [`Error::InvalidConfig`]
    pub(crate) fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether this error should stop the process at startup
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvalidConfig { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {e}"))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(Error::Configuration("missing threshold".to_string()).is_configuration());
        assert!(Error::invalid_config("routing.semantic_floor", "out of range").is_configuration());
        assert!(!Error::Memory("redis down".to_string()).is_configuration());
    }

    #[test]
    fn test_llm_error_conversion() {
        let err: Error = dualrag_llm::Error::Timeout(100).into();
        assert!(matches!(err, Error::Llm(_)));
        assert_eq!(err.to_string(), "llm error: timeout after 100ms");
    }
}
