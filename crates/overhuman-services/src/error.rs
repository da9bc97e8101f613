//! Error types for the daemon services.

use thiserror::Error;

/// Errors from the HTTP surfaces and the heartbeat ticker.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ServiceError {
    /// The daemon input queue is gone.
    #[error("input queue closed")]
    QueueClosed,

    /// Binding the listen address failed.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// The HTTP server failed while serving.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// A convenience alias for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_strings() {
        assert_eq!(ServiceError::QueueClosed.to_string(), "input queue closed");
        let err = ServiceError::Bind(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "in use",
        ));
        assert!(err.to_string().starts_with("bind failed"));
    }
}
