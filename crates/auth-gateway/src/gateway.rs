//! Authenticated gateway façade
//!
//! `AuthGateway` is what the rest of the application holds: one instance per
//! session, cheap to clone, owning the pipeline, the transport and the refresh
//! coordinator. Independent instances share nothing.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use session_auth::{CredentialPair, CredentialStore};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::coordinator::{RefreshCoordinator, RefreshState};
use crate::error::{Error, Result};
use crate::middleware::{BearerAuth, Pipeline, RequestMiddleware};
use crate::request::{ApiRequest, ApiResponse};
use crate::teardown::{SessionState, SessionTeardown};
use crate::transport::Transport;

/// Upper bound on a single refresh call.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for `AuthGateway`.
pub struct GatewayBuilder {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    refresh_timeout: Duration,
    middleware: Vec<Arc<dyn RequestMiddleware>>,
}

impl GatewayBuilder {
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Append a stage after bearer authentication.
    pub fn middleware(mut self, stage: Arc<dyn RequestMiddleware>) -> Self {
        self.middleware.push(stage);
        self
    }

    pub fn build(self) -> AuthGateway {
        let mut pipeline = Pipeline::new();
        pipeline.push(Arc::new(BearerAuth::new(self.store.clone())));
        for stage in self.middleware {
            pipeline.push(stage);
        }

        let teardown = SessionTeardown::new(self.store.clone());
        let coordinator = RefreshCoordinator::new(
            self.store.clone(),
            self.transport.clone(),
            teardown.clone(),
            self.refresh_timeout,
        );

        info!(
            middleware = ?pipeline.names(),
            refresh_timeout_secs = self.refresh_timeout.as_secs(),
            session = teardown.current().label(),
            "gateway ready"
        );

        AuthGateway {
            inner: Arc::new(Inner {
                pipeline,
                transport: self.transport,
                store: self.store,
                coordinator,
                teardown,
            }),
        }
    }
}

struct Inner {
    pipeline: Pipeline,
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    coordinator: RefreshCoordinator,
    teardown: SessionTeardown,
}

/// Sends calls with the session's credentials and recovers from expiry.
#[derive(Clone)]
pub struct AuthGateway {
    inner: Arc<Inner>,
}

impl AuthGateway {
    pub fn builder(transport: Arc<dyn Transport>, store: Arc<CredentialStore>) -> GatewayBuilder {
        GatewayBuilder {
            transport,
            store,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            middleware: Vec::new(),
        }
    }

    /// Send a call.
    ///
    /// Any status other than 401 is returned as a response. A 401 on a call
    /// that has not been retried goes to the refresh coordinator; a 401 on a
    /// retried call is `Error::CredentialExpired`.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        self.inner.pipeline.apply(&mut request);

        let response = self.inner.transport.execute(request.clone()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        if request.is_retried() {
            return Err(Error::CredentialExpired);
        }

        debug!(method = %request.method(), path = request.path(), "credential expired");
        self.inner.coordinator.handle_expired(request).await
    }

    /// Store a pair obtained from sign-in and mark the session authenticated.
    ///
    /// A refresh still in flight will not overwrite this pair.
    pub async fn sign_in(&self, pair: CredentialPair) -> Result<()> {
        self.inner.coordinator.sign_in(pair).await
    }

    /// Explicit sign-out. Returns whether a session was ended.
    ///
    /// A refresh still in flight will not write its pair back; calls waiting
    /// on it fail with `Error::SignedOut`.
    pub async fn sign_out(&self) -> bool {
        self.inner.coordinator.sign_out().await
    }

    /// Subscribe to session transitions.
    pub fn session(&self) -> watch::Receiver<SessionState> {
        self.inner.teardown.subscribe()
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.teardown.current()
    }

    pub async fn refresh_state(&self) -> RefreshState {
        self.inner.coordinator.state().await
    }

    /// Calls currently parked behind a refresh.
    pub async fn queued_calls(&self) -> usize {
        self.inner.coordinator.queued().await
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.inner.store
    }
}
