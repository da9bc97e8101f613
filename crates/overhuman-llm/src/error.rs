//! Provider error types for overhuman-llm.
//!
//! All provider operations return [`Result<T>`] which uses [`ProviderError`]
//! as the error type. The daemon converts into the workspace-wide taxonomy
//! at the crate boundary via the provided `From` impl.

use thiserror::Error;

use overhuman_types::{OverhumanError, ProviderErrorKind};

/// Errors that can occur when interacting with an LLM provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The request never reached the provider (DNS, TLS, connect, read).
    #[error("network error: {0}")]
    Network(String),

    /// Authentication with the provider was rejected (HTTP 401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The provider returned a rate-limit response (HTTP 429).
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait time before retrying, in milliseconds.
        retry_after_ms: u64,
    },

    /// The provider failed internally (HTTP 5xx).
    #[error("server error (HTTP {status}): {body}")]
    ServerError {
        /// The HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The provider has not been configured (e.g. missing API key).
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// The provider returned a response that could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request timed out.
    #[error("timeout")]
    Timeout,
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<ProviderError> for OverhumanError {
    fn from(e: ProviderError) -> Self {
        let kind = match &e {
            ProviderError::AuthFailed(_) | ProviderError::NotConfigured(_) => {
                ProviderErrorKind::Auth
            }
            ProviderError::RateLimited { .. } => ProviderErrorKind::RateLimit,
            ProviderError::ServerError { .. } => ProviderErrorKind::ServerError,
            ProviderError::Timeout => {
                return OverhumanError::Timeout {
                    operation: "llm completion".into(),
                };
            }
            ProviderError::Network(_) | ProviderError::InvalidResponse(_) => {
                ProviderErrorKind::Network
            }
        };
        OverhumanError::Provider {
            kind,
            message: e.to_string(),
        }
    }
}

/// A convenience type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_network() {
        let err = ProviderError::Network("connection reset".into());
        assert_eq!(err.to_string(), "network error: connection reset");
    }

    #[test]
    fn display_rate_limited() {
        let err = ProviderError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.to_string(), "rate limited: retry after 5000ms");
    }

    #[test]
    fn display_server_error() {
        let err = ProviderError::ServerError {
            status: 503,
            body: "overloaded".into(),
        };
        assert_eq!(err.to_string(), "server error (HTTP 503): overloaded");
    }

    #[test]
    fn converts_into_workspace_taxonomy() {
        let err: OverhumanError = ProviderError::AuthFailed("bad key".into()).into();
        assert!(matches!(
            err,
            OverhumanError::Provider {
                kind: ProviderErrorKind::Auth,
                ..
            }
        ));

        let err: OverhumanError = ProviderError::ServerError {
            status: 500,
            body: String::new(),
        }
        .into();
        assert!(matches!(
            err,
            OverhumanError::Provider {
                kind: ProviderErrorKind::ServerError,
                ..
            }
        ));

        let err: OverhumanError = ProviderError::Timeout.into();
        assert!(matches!(err, OverhumanError::Timeout { .. }));
    }
}
