//! Error types for the context budget manager.
//!
//! Two layers: [`ProviderError`] covers a single failed call to a generation
//! or embedding backend, and [`DistillError`] is what every public engine
//! operation returns. Non-convergence during compression has no variant
//! here: it ends in truncation.

use crate::archive::index::IndexError;

/// Failure of one call to an external capability (generation or embedding).
///
/// The core never retries these; the OpenRouter adapters can be configured
/// to retry the transient subset (see [`ProviderError::is_transient`]).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status code.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The backend answered 200 but reported an error in the payload.
    #[error("API error: {0}")]
    Api(String),

    /// The response body was not the expected JSON shape.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The backend returned no content at all.
    #[error("empty response from provider")]
    EmptyResponse,
}

impl ProviderError {
    /// Whether this failure is worth retrying (429, 5xx, network trouble).
    ///
    /// Never true for 4xx client errors other than 429.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Request(msg) => {
                let lower = msg.to_lowercase();
                [
                    "connection reset",
                    "connection refused",
                    "timed out",
                    "timeout",
                    "broken pipe",
                    "network",
                    "error sending request",
                ]
                .iter()
                .any(|p| lower.contains(p))
            }
            ProviderError::Http { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            ProviderError::Api(_) | ProviderError::Parse(_) | ProviderError::EmptyResponse => {
                false
            }
        }
    }
}

/// Errors returned by engine, archive, and compression operations.
#[derive(Debug, thiserror::Error)]
pub enum DistillError {
    /// Invalid configuration or a missing capability. Raised at construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// A generation or embedding call failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The embedder produced a vector of the wrong length for this store.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The vector index rejected an insert.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Reading a config file or input failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A config file was not valid JSON for [`EngineConfigOverrides`](crate::config::EngineConfigOverrides).
    #[error("invalid config file: {0}")]
    ConfigFile(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = DistillError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        for status in [429, 500, 502, 503, 504] {
            let err = ProviderError::Http {
                status,
                body: String::new(),
            };
            assert!(err.is_transient(), "HTTP {status} should be transient");
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [400, 401, 403, 404, 422] {
            let err = ProviderError::Http {
                status,
                body: "bad request".into(),
            };
            assert!(!err.is_transient(), "HTTP {status} should not be retried");
        }
        assert!(!ProviderError::EmptyResponse.is_transient());
        assert!(!ProviderError::Parse("eof".into()).is_transient());
    }

    #[test]
    fn network_failures_are_transient() {
        assert!(ProviderError::Request("connection reset by peer".into()).is_transient());
        assert!(ProviderError::Request("operation timed out".into()).is_transient());
        assert!(!ProviderError::Request("builder error: invalid URL".into()).is_transient());
    }

    #[test]
    fn provider_error_converts_into_distill_error() {
        let err: DistillError = ProviderError::EmptyResponse.into();
        assert!(matches!(err, DistillError::Provider(_)));
        assert!(err.to_string().contains("empty response"));
    }

    #[test]
    fn http_error_display_includes_status() {
        let err = ProviderError::Http {
            status: 503,
            body: "overloaded".into(),
        };
        assert_eq!(err.to_string(), "HTTP 503: overloaded");
    }
}
