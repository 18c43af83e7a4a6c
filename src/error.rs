//! Error types for netservice-register.

use std::time::Duration;

use crate::stream_error::StreamError;

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The engine refused to start the registration.
    #[error("Registration failed: {0}")]
    Registration(#[from] StreamError),

    /// `submit` was called on a session that already submitted.
    #[error("Session is already registering")]
    AlreadyRegistering,

    /// The session has been released.
    #[error("Invalid session: already released")]
    InvalidSession,

    /// Metadata could not be encoded, decoded or attached.
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// No completion arrived before the caller's deadline.
    #[error("Registration did not complete within {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Create a metadata error.
    pub fn metadata<S: Into<String>>(msg: S) -> Self {
        Self::Metadata(msg.into())
    }

    /// The engine error carried by [`Error::Registration`], if any.
    pub fn stream_error(&self) -> Option<&StreamError> {
        match self {
            Self::Registration(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_error::NetServicesCode;

    #[test]
    fn registration_error_display_includes_stream_error() {
        let err: Error = StreamError::net_services(NetServicesCode::Collision).into();
        assert_eq!(
            err.to_string(),
            "Registration failed: NetServices: -72001 (collision)"
        );
        assert!(err.stream_error().is_some_and(StreamError::is_collision));
    }

    #[test]
    fn usage_errors_carry_no_stream_error() {
        assert!(Error::InvalidSession.stream_error().is_none());
        assert!(Error::AlreadyRegistering.stream_error().is_none());
        assert_eq!(
            Error::metadata("entry too long").to_string(),
            "Metadata error: entry too long"
        );
    }
}
