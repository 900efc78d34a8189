//! Per-request errors and their HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors the proxy turns into JSON error responses.
#[derive(Error, Debug)]
pub enum Error {
    /// The gateway could not complete the call
    #[error(transparent)]
    Gateway(#[from] auth_gateway::Error),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("response build error: {0}")]
    Response(String),
}

impl Error {
    /// Status code returned to the inbound client.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Gateway(
                auth_gateway::Error::CredentialExpired
                | auth_gateway::Error::NoRefreshToken
                | auth_gateway::Error::RefreshFailed(_)
                | auth_gateway::Error::SignedOut,
            ) => StatusCode::UNAUTHORIZED,
            Error::Gateway(
                auth_gateway::Error::InvalidRequest(_) | auth_gateway::Error::Storage(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Gateway(auth_gateway::Error::Http(_) | auth_gateway::Error::Decode(_)) => {
                StatusCode::BAD_GATEWAY
            }
            Error::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Error::Response(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Value of the `error.type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Gateway(e) if e.is_session_ended() => "session_ended",
            Error::Gateway(auth_gateway::Error::CredentialExpired) => "credential_expired",
            Error::Gateway(_) | Error::Response(_) => "proxy_error",
            Error::InvalidBody(_) => "invalid_request",
        }
    }

    /// JSON error response: {"error":{"type":"...","message":"...","request_id":"req_..."}}
    pub fn into_response_with_id(self, request_id: &str) -> Response {
        let body = serde_json::json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
                "request_id": request_id,
            }
        });
        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
