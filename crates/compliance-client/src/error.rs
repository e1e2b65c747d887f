//! Backend client error types.

use thiserror::Error;

/// A result type using `BackendError`.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors reported by the compliance backend or the transport in front of it.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend answered with a non-success HTTP status.
    #[error("{message}")]
    Status {
        /// HTTP status code reported by the backend.
        status: u16,
        /// Message extracted from the backend's error body.
        message: String,
    },

    /// The request never produced a response (connect, TLS, timeout).
    #[error("backend request failed: {0}")]
    Transport(String),

    /// The backend answered but the body could not be decoded.
    #[error("unexpected backend response: {0}")]
    Decode(String),

    /// The credential handshake performed at connect time was rejected.
    #[error("backend handshake failed: {0}")]
    Handshake(String),

    /// No access token was provided.
    #[error("backend access token is not configured")]
    MissingToken,
}

impl BackendError {
    /// Create a status error.
    #[must_use]
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// The HTTP status reported by the backend, if there was one.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if the backend rejected the current token.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }

    /// Returns `true` if retrying the same request might succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_forwarded() {
        assert_eq!(BackendError::status(409, "exists").http_status(), Some(409));
        assert_eq!(BackendError::Transport("down".into()).http_status(), None);
        assert_eq!(BackendError::MissingToken.http_status(), None);
    }

    #[test]
    fn status_error_displays_backend_message() {
        let err = BackendError::status(409, "vault already exists");
        assert_eq!(err.to_string(), "vault already exists");
    }

    #[test]
    fn retriable_errors() {
        assert!(BackendError::Transport("reset".into()).is_retriable());
        assert!(BackendError::status(503, "busy").is_retriable());
        assert!(BackendError::status(429, "slow down").is_retriable());
        assert!(!BackendError::status(404, "missing").is_retriable());
        assert!(!BackendError::Handshake("nope".into()).is_retriable());
    }

    #[test]
    fn unauthorized_detection() {
        assert!(BackendError::status(401, "expired").is_unauthorized());
        assert!(!BackendError::status(403, "forbidden").is_unauthorized());
    }
}
