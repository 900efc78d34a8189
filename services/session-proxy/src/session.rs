//! Session endpoints
//!
//! `POST /session` stores the pair returned by the platform's sign-in,
//! `DELETE /session` signs out, `GET /session` reports the session state.
//! Tokens are accepted here and never returned.

use auth_gateway::AuthGateway;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use session_auth::CredentialPair;
use tracing::info;

use crate::error::Error;

/// Body of `POST /session`, in the platform's sign-in response shape.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInBody {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
}

pub async fn sign_in(
    gateway: &AuthGateway,
    body: std::result::Result<Json<SignInBody>, JsonRejection>,
    request_id: &str,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return Error::InvalidBody(rejection.body_text()).into_response_with_id(request_id);
        }
    };
    if body.access_token.is_empty() {
        return Error::InvalidBody("accessToken must not be empty".into())
            .into_response_with_id(request_id);
    }

    let has_refresh_token = !body.refresh_token.is_empty();
    match gateway
        .sign_in(CredentialPair::new(body.access_token, body.refresh_token))
        .await
    {
        Ok(()) => {
            info!(has_refresh_token, "session credentials stored");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => Error::from(e).into_response_with_id(request_id),
    }
}

pub async fn sign_out(gateway: &AuthGateway) -> Response {
    if gateway.sign_out().await {
        info!("session signed out on request");
    }
    StatusCode::NO_CONTENT.into_response()
}

pub fn status(gateway: &AuthGateway) -> Response {
    Json(serde_json::json!({ "status": gateway.session_state().label() })).into_response()
}
