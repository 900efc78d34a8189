//! Refresh endpoint payloads
//!
//! The platform exchanges a refresh token for a new pair at
//! `POST /auth/refresh-token`. Request and response bodies are camelCase JSON:
//!
//! ```text
//! -> {"refreshToken": "..."}
//! <- {"accessToken": "...", "refreshToken": "..."}
//! ```
//!
//! Sending the call is the gateway's job; this module only builds and decodes
//! the bodies.

use common::Secret;
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialPair;
use crate::error::{Error, Result};

/// Body of the refresh call.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
}

/// Successful response of the refresh call. Extra fields are ignored.
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenPairResponse> for CredentialPair {
    fn from(response: TokenPairResponse) -> Self {
        CredentialPair::new(response.access_token, response.refresh_token)
    }
}

/// Serialize the refresh request body for the given refresh token.
pub fn refresh_request_body(refresh_token: &Secret<String>) -> Result<Vec<u8>> {
    serde_json::to_vec(&RefreshTokenRequest {
        refresh_token: refresh_token.expose(),
    })
    .map_err(|e| Error::TokenResponse(format!("serializing refresh request: {e}")))
}

/// Decode a 2xx refresh response body into a credential pair.
pub fn parse_refresh_response(body: &[u8]) -> Result<CredentialPair> {
    serde_json::from_slice::<TokenPairResponse>(body)
        .map(CredentialPair::from)
        .map_err(|e| Error::TokenResponse(e.to_string()))
}
