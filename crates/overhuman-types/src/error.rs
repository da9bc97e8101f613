//! Error types for the overhuman daemon.
//!
//! Provides [`OverhumanError`] as the top-level error taxonomy shared by the
//! pipeline, the storage layer, and the daemon wiring. Provider and channel
//! crates define their own error types and convert into this one at the
//! crate boundary. The enum is non-exhaustive to allow future extension
//! without breaking downstream.

use thiserror::Error;

/// Subcases of a provider failure, carried inside
/// [`OverhumanError::Provider`] so callers can branch on retryability
/// without parsing message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Authentication was rejected (HTTP 401/403).
    Auth,
    /// The provider is throttling requests (HTTP 429).
    RateLimit,
    /// The provider failed internally (HTTP 5xx).
    ServerError,
    /// The request never reached the provider (DNS, TLS, connect, read).
    Network,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate-limit",
            Self::ServerError => "server-error",
            Self::Network => "network",
        };
        f.write_str(s)
    }
}

/// Top-level error type for the overhuman daemon.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum OverhumanError {
    /// An id, fingerprint, or version that does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up (e.g. "fingerprint ab12…", "soul version 4").
        what: String,
    },

    /// A duplicate registration or an already-initialized resource.
    #[error("conflict: {what}")]
    Conflict {
        /// What already exists.
        what: String,
    },

    /// Caller-supplied input was rejected before any work happened.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Why the input was rejected.
        reason: String,
    },

    /// An identity-document update modified or removed the anchor block.
    #[error("anchor violation: {reason}")]
    AnchorViolation {
        /// Which part of the anchor contract was broken.
        reason: String,
    },

    /// An LLM provider call failed.
    #[error("provider error ({kind}): {message}")]
    Provider {
        /// Which failure subcase this is.
        kind: ProviderErrorKind,
        /// Provider-supplied or transport-level message.
        message: String,
    },

    /// An operation exceeded its deadline.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Human-readable name of the operation that timed out.
        operation: String,
    },

    /// The ambient context was cancelled mid-operation.
    #[error("cancelled")]
    Cancelled,

    /// The durable store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OverhumanError {
    /// Shorthand for [`OverhumanError::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Shorthand for [`OverhumanError::Conflict`].
    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict { what: what.into() }
    }

    /// Shorthand for [`OverhumanError::InvalidInput`].
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// True when retrying the same operation may succeed.
    ///
    /// Auth failures and input rejections are permanent; network hiccups,
    /// rate limits, server errors, and timeouts are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider { kind, .. } => !matches!(kind, ProviderErrorKind::Auth),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// A convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, OverhumanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = OverhumanError::not_found("fingerprint ab12");
        assert_eq!(err.to_string(), "not found: fingerprint ab12");
    }

    #[test]
    fn conflict_display() {
        let err = OverhumanError::conflict("soul already initialized");
        assert_eq!(err.to_string(), "conflict: soul already initialized");
    }

    #[test]
    fn anchor_violation_display() {
        let err = OverhumanError::AnchorViolation {
            reason: "anchor block differs from previous version".into(),
        };
        assert!(err.to_string().starts_with("anchor violation:"));
    }

    #[test]
    fn provider_error_carries_kind() {
        let err = OverhumanError::Provider {
            kind: ProviderErrorKind::Auth,
            message: "invalid api key".into(),
        };
        assert_eq!(err.to_string(), "provider error (auth): invalid api key");
    }

    #[test]
    fn transient_classification() {
        let auth = OverhumanError::Provider {
            kind: ProviderErrorKind::Auth,
            message: "nope".into(),
        };
        assert!(!auth.is_transient());

        let net = OverhumanError::Provider {
            kind: ProviderErrorKind::Network,
            message: "connection reset".into(),
        };
        assert!(net.is_transient());

        let timeout = OverhumanError::Timeout {
            operation: "llm_call".into(),
        };
        assert!(timeout.is_transient());

        assert!(!OverhumanError::Cancelled.is_transient());
        assert!(!OverhumanError::invalid_input("empty payload").is_transient());
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: OverhumanError = io_err.into();
        assert!(matches!(err, OverhumanError::Io(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{{bad}}").unwrap_err();
        let err: OverhumanError = json_err.into();
        assert!(matches!(err, OverhumanError::Json(_)));
    }

    #[test]
    fn result_alias_works() {
        fn ok_fn() -> Result<i32> {
            Ok(7)
        }
        fn err_fn() -> Result<i32> {
            Err(OverhumanError::Cancelled)
        }
        assert_eq!(ok_fn().unwrap(), 7);
        assert!(err_fn().is_err());
    }
}
