//! Error types for credential storage and refresh payloads

/// Errors from credential operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("invalid token response: {0}")]
    TokenResponse(String),
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;
