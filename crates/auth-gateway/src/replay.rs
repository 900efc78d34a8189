//! Replay of calls that failed on an expired credential
//!
//! A replay is the call's one refresh-triggered retry. If the server rejects
//! the fresh token too, the call fails with `CredentialExpired`; it is never
//! handed back to the coordinator.

use std::sync::Arc;

use common::Secret;
use futures_util::future::join_all;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::metrics;
use crate::middleware::set_bearer;
use crate::queue::PendingCall;
use crate::request::{ApiRequest, ApiResponse};
use crate::transport::Transport;

/// Re-issues calls with a freshly obtained access token.
#[derive(Clone)]
pub struct ReplayDispatcher {
    transport: Arc<dyn Transport>,
}

impl ReplayDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Overwrite the call's authorization with `access_token` and send it again.
    ///
    /// Non-401 statuses (a genuine 404 or 500) come back as responses, exactly
    /// as they would have without the refresh.
    pub async fn replay(&self, mut request: ApiRequest, access_token: &Secret<String>) -> Result<ApiResponse> {
        set_bearer(request.headers_mut(), access_token);
        let method = request.method().clone();
        let path = request.path().to_owned();

        match self.transport.execute(request).await {
            Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {
                metrics::record_replay("expired");
                warn!(%method, path, "replayed call rejected with fresh credentials");
                Err(Error::CredentialExpired)
            }
            Ok(response) => {
                metrics::record_replay("completed");
                debug!(%method, path, status = response.status().as_u16(), "replayed call completed");
                Ok(response)
            }
            Err(e) => {
                metrics::record_replay("error");
                warn!(%method, path, error = %e, "replayed call failed");
                Err(e)
            }
        }
    }

    /// Replay a batch of parked calls concurrently, completing each one.
    pub async fn replay_all(
        &self,
        calls: impl IntoIterator<Item = PendingCall>,
        access_token: &Secret<String>,
    ) {
        join_all(
            calls
                .into_iter()
                .map(|call| call.replay(self, access_token)),
        )
        .await;
    }
}
