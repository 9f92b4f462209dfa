//! Error types for dualrag-llm

use thiserror::Error;

/// LLM error type
#[derive(Debug, Error)]
pub enum Error {
    /// Provider not configured
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// API error (non-success HTTP status)
    #[error("api error: {0}")]
    Api(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimit,

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Embedding provider error
    #[error("provider error: {0}")]
    Provider(String),
}

impl Error {
    /// Whether a retry of the same request may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_) | Self::RateLimit)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Timeout(500).is_transient());
        assert!(Error::Network("reset".to_string()).is_transient());
        assert!(Error::RateLimit.is_transient());
        assert!(!Error::InvalidResponse("bad json".to_string()).is_transient());
        assert!(!Error::Api("HTTP 400".to_string()).is_transient());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Timeout(250).to_string(), "timeout after 250ms");
        assert_eq!(
            Error::NotConfigured("ollama".to_string()).to_string(),
            "provider not configured: ollama"
        );
    }
}
