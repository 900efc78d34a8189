//! Error types for gateway calls

/// Errors surfaced to the caller of a gateway call.
///
/// `Clone` because a single refresh failure rejects every call that was
/// waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("credential expired")]
    CredentialExpired,

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("session signed out")]
    SignedOut,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("response decode error: {0}")]
    Decode(String),

    #[error("credential storage error: {0}")]
    Storage(String),
}

impl From<session_auth::Error> for Error {
    fn from(err: session_auth::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl Error {
    /// Whether this error ended the session (the caller must sign in again).
    pub fn is_session_ended(&self) -> bool {
        matches!(
            self,
            Error::NoRefreshToken | Error::RefreshFailed(_) | Error::SignedOut
        )
    }
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_descriptive() {
        assert_eq!(Error::NoRefreshToken.to_string(), "no refresh token available");
        assert_eq!(
            Error::RefreshFailed("refresh endpoint returned 500".into()).to_string(),
            "token refresh failed: refresh endpoint returned 500"
        );
    }

    #[test]
    fn session_ending_errors_are_classified() {
        assert!(Error::NoRefreshToken.is_session_ended());
        assert!(Error::RefreshFailed("x".into()).is_session_ended());
        assert!(Error::SignedOut.is_session_ended());
        assert!(!Error::CredentialExpired.is_session_ended());
        assert!(!Error::Http("connection refused".into()).is_session_ended());
    }

    #[test]
    fn storage_errors_convert() {
        let err: Error = session_auth::Error::Io("disk full".into()).into();
        assert!(matches!(err, Error::Storage(msg) if msg.contains("disk full")));
    }
}
