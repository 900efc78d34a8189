//! Refresh coordinator: single-flight refresh and the Idle/Refreshing machine
//!
//! The transition logic is a pure function, `handle_event`, returning the next
//! state and the action the caller must execute. `RefreshCoordinator` owns the
//! state and the waiting queue behind one mutex and performs the I/O implied
//! by each action.
//!
//! Transitions:
//! - Idle + expired call, token rotated meanwhile → Idle, replay with current token
//! - Idle + expired call, no refresh token → Idle, teardown
//! - Idle + expired call → Refreshing, start the (single) refresh call
//! - Refreshing + expired call → Refreshing, park the call in the queue
//! - Refreshing + refresh succeeded → Idle, replay queue and trigger
//! - Refreshing + refresh failed → Idle, reject queue and trigger, teardown
//!
//! The refresh itself runs in a spawned task, so a caller that stops waiting
//! cannot leave the machine stuck in Refreshing.
//!
//! Sign-in and sign-out go through the same mutex and bump the session
//! generation. A refresh that finishes under a newer generation leaves the
//! store alone and settles its calls against whatever the store holds now.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::Secret;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use session_auth::{CredentialPair, CredentialStore, REFRESH_TOKEN_PATH};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics;
use crate::queue::{PendingCall, Reply, WaitingQueue};
use crate::replay::ReplayDispatcher;
use crate::request::{ApiRequest, ApiResponse};
use crate::teardown::SessionTeardown;
use crate::transport::Transport;

/// Whether a refresh call is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

impl RefreshState {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            RefreshState::Idle => "idle",
            RefreshState::Refreshing => "refreshing",
        }
    }
}

/// Events that drive the refresh machine.
#[derive(Debug)]
pub enum RefreshEvent {
    /// A call came back 401 with its retry still available.
    CredentialExpired {
        /// Refresh token in the store when the failure was handled
        refresh_token: Option<Secret<String>>,
        /// Set when the store already holds a different access token than the
        /// one the failed call carried
        rotated_to: Option<Secret<String>>,
    },
    /// The refresh call returned a new pair.
    RefreshSucceeded,
    /// The refresh call failed or timed out.
    RefreshFailed,
}

/// Actions the coordinator executes after a transition.
#[derive(Debug, PartialEq, Eq)]
pub enum RefreshAction {
    /// Become the owner of the refresh and send it with this token
    StartRefresh { refresh_token: Secret<String> },
    /// Park the call until the in-flight refresh finishes
    Enqueue,
    /// Replay directly with the already-rotated access token
    ReplayWithCurrent { access_token: Secret<String> },
    /// Nothing to refresh with; end the session and fail the call
    Teardown,
    /// Replay the queue and the triggering call with the new token
    DrainWithSuccess,
    /// Reject the queue and the triggering call, end the session
    DrainWithFailure,
    /// No-op
    None,
}

/// Handle a transition. Pure function: no I/O.
pub fn handle_event(state: RefreshState, event: RefreshEvent) -> (RefreshState, RefreshAction) {
    match (state, event) {
        // --- Refreshing ---
        (RefreshState::Refreshing, RefreshEvent::CredentialExpired { .. }) => {
            (RefreshState::Refreshing, RefreshAction::Enqueue)
        }
        (RefreshState::Refreshing, RefreshEvent::RefreshSucceeded) => {
            (RefreshState::Idle, RefreshAction::DrainWithSuccess)
        }
        (RefreshState::Refreshing, RefreshEvent::RefreshFailed) => {
            (RefreshState::Idle, RefreshAction::DrainWithFailure)
        }

        // --- Idle ---
        (
            RefreshState::Idle,
            RefreshEvent::CredentialExpired {
                rotated_to: Some(access_token),
                ..
            },
        ) => (
            RefreshState::Idle,
            RefreshAction::ReplayWithCurrent { access_token },
        ),
        (
            RefreshState::Idle,
            RefreshEvent::CredentialExpired {
                refresh_token: Some(refresh_token),
                ..
            },
        ) => (
            RefreshState::Refreshing,
            RefreshAction::StartRefresh { refresh_token },
        ),
        (RefreshState::Idle, RefreshEvent::CredentialExpired { .. }) => {
            (RefreshState::Idle, RefreshAction::Teardown)
        }

        // A completion with no refresh in flight changes nothing
        (RefreshState::Idle, RefreshEvent::RefreshSucceeded | RefreshEvent::RefreshFailed) => {
            (RefreshState::Idle, RefreshAction::None)
        }
    }
}

/// Refresh state plus the calls waiting on it, guarded together.
struct Machine {
    state: RefreshState,
    queue: WaitingQueue,
    /// Bumped on every sign-in and sign-out
    generation: u64,
}

/// How the calls behind a finished refresh are completed.
enum Settlement {
    Replay(Secret<String>),
    Reject(Error),
}

struct Inner {
    machine: Mutex<Machine>,
    store: Arc<CredentialStore>,
    transport: Arc<dyn Transport>,
    dispatcher: ReplayDispatcher,
    teardown: SessionTeardown,
    refresh_timeout: Duration,
}

/// Coordinates credential refresh for one gateway instance.
///
/// Cheap to clone; clones share the same machine.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        transport: Arc<dyn Transport>,
        teardown: SessionTeardown,
        refresh_timeout: Duration,
    ) -> Self {
        let dispatcher = ReplayDispatcher::new(transport.clone());
        Self {
            inner: Arc::new(Inner {
                machine: Mutex::new(Machine {
                    state: RefreshState::Idle,
                    queue: WaitingQueue::new(),
                    generation: 0,
                }),
                store,
                transport,
                dispatcher,
                teardown,
                refresh_timeout,
            }),
        }
    }

    /// Current refresh state.
    pub async fn state(&self) -> RefreshState {
        self.inner.machine.lock().await.state
    }

    /// Number of calls parked behind the in-flight refresh.
    pub async fn queued(&self) -> usize {
        self.inner.machine.lock().await.queue.len()
    }

    /// Store a signed-in pair and signal `Authenticated`.
    pub async fn sign_in(&self, pair: CredentialPair) -> Result<()> {
        let mut machine = self.inner.machine.lock().await;
        machine.generation += 1;
        self.inner.store.set(pair).await?;
        if self.inner.teardown.mark_authenticated() {
            info!("session signed in");
        }
        Ok(())
    }

    /// End the session on request. Returns whether a session was ended.
    pub async fn sign_out(&self) -> bool {
        let mut machine = self.inner.machine.lock().await;
        machine.generation += 1;
        self.inner.teardown.clear().await
    }

    /// Recover a call that came back 401.
    ///
    /// Uses up the call's retry, then either starts the refresh, waits for the
    /// one already running, replays with a token that rotated meanwhile, or
    /// tears the session down when there is nothing to refresh with.
    pub async fn handle_expired(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        request.mark_retried();

        let mut machine = self.inner.machine.lock().await;

        // Read the store under the lock: a refresh writes the new pair before
        // it returns the machine to Idle.
        let current = self.inner.store.get();
        let rotated_to = match (request.bearer_token(), &current) {
            (Some(sent), Some(pair)) if sent == pair.access_token.expose() => None,
            (_, Some(pair)) => Some(pair.access_token.clone()),
            (_, None) => None,
        };
        let event = RefreshEvent::CredentialExpired {
            refresh_token: self.inner.store.refresh_token(),
            rotated_to,
        };

        let (next, action) = handle_event(machine.state, event);
        machine.state = next;

        match action {
            RefreshAction::Enqueue => {
                let reply = machine.queue.enqueue(request);
                let queued = machine.queue.len();
                drop(machine);
                metrics::record_queued();
                debug!(queued, "refresh in flight, call queued");
                await_reply(reply).await
            }
            RefreshAction::ReplayWithCurrent { access_token } => {
                drop(machine);
                debug!("credential rotated while call was in flight, replaying");
                self.inner.dispatcher.replay(request, &access_token).await
            }
            RefreshAction::StartRefresh { refresh_token } => {
                let generation = machine.generation;
                drop(machine);
                let (trigger, reply) = PendingCall::new(request);
                let coordinator = self.clone();
                tokio::spawn(async move {
                    coordinator
                        .run_refresh(refresh_token, generation, trigger)
                        .await;
                });
                await_reply(reply).await
            }
            RefreshAction::Teardown => {
                warn!("credential expired and no refresh token available, ending session");
                self.inner.teardown.clear().await;
                drop(machine);
                Err(Error::NoRefreshToken)
            }
            RefreshAction::DrainWithSuccess | RefreshAction::DrainWithFailure | RefreshAction::None => {
                // Not produced for CredentialExpired
                drop(machine);
                Err(Error::CredentialExpired)
            }
        }
    }

    /// Own the refresh: send it, then settle every call that waited on it.
    async fn run_refresh(self, refresh_token: Secret<String>, generation: u64, trigger: PendingCall) {
        info!("access token expired, refreshing session");
        let started = Instant::now();

        let outcome = match tokio::time::timeout(
            self.inner.refresh_timeout,
            self.request_refresh(&refresh_token),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::RefreshFailed(format!(
                "no response within {}s",
                self.inner.refresh_timeout.as_secs()
            ))),
        };

        let (settlement, queue) = self.settle(generation, outcome).await;
        debug!(
            queued = queue.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "settling calls behind refresh"
        );
        match settlement {
            Settlement::Replay(access_token) => {
                let dispatcher = &self.inner.dispatcher;
                tokio::join!(
                    queue.drain_with_success(&access_token, dispatcher),
                    trigger.replay(dispatcher, &access_token),
                );
            }
            Settlement::Reject(error) => {
                queue.drain_with_failure(&error);
                trigger.complete(Err(error));
            }
        }
    }

    /// Apply the refresh outcome to the store, return the machine to Idle and
    /// take every call queued so far.
    ///
    /// Holds the machine lock throughout, so a sign-in or sign-out cannot
    /// interleave with the store write.
    async fn settle(
        &self,
        generation: u64,
        outcome: Result<CredentialPair>,
    ) -> (Settlement, WaitingQueue) {
        let mut machine = self.inner.machine.lock().await;
        let event = match outcome {
            Ok(_) => RefreshEvent::RefreshSucceeded,
            Err(_) => RefreshEvent::RefreshFailed,
        };

        let settlement = if machine.generation != generation {
            metrics::record_refresh("superseded");
            let current = self.inner.store.access_token();
            info!(
                signed_in = current.is_some(),
                "session changed during refresh, discarding refresh result"
            );
            match current {
                Some(access_token) => Settlement::Replay(access_token),
                None => Settlement::Reject(Error::SignedOut),
            }
        } else {
            match outcome {
                Ok(pair) => {
                    let access_token = pair.access_token.clone();
                    if let Err(e) = self.inner.store.set(pair).await {
                        warn!(error = %e, "failed to persist refreshed credentials");
                    }
                    metrics::record_refresh("success");
                    info!("session refreshed, replaying calls");
                    Settlement::Replay(access_token)
                }
                Err(error) => {
                    self.inner.teardown.clear().await;
                    metrics::record_refresh("failure");
                    warn!(error = %error, "session refresh failed, signed out");
                    Settlement::Reject(error)
                }
            }
        };

        let (next, action) = handle_event(machine.state, event);
        machine.state = next;
        debug!(?action, "refresh finished");
        (settlement, std::mem::take(&mut machine.queue))
    }

    /// Send the refresh call. Every failure mode is a `RefreshFailed`.
    async fn request_refresh(&self, refresh_token: &Secret<String>) -> Result<CredentialPair> {
        let body = session_auth::refresh_request_body(refresh_token)
            .map_err(|e| Error::RefreshFailed(e.to_string()))?;
        let request = ApiRequest::post(REFRESH_TOKEN_PATH)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body);

        let response = self
            .inner
            .transport
            .execute(request)
            .await
            .map_err(|e| Error::RefreshFailed(e.to_string()))?;

        if !response.is_success() {
            return Err(Error::RefreshFailed(format!(
                "refresh endpoint returned {}",
                response.status()
            )));
        }

        session_auth::parse_refresh_response(response.body())
            .map_err(|e| Error::RefreshFailed(e.to_string()))
    }
}

/// Wait for a parked call's outcome.
async fn await_reply(reply: Reply) -> Result<ApiResponse> {
    reply.await.unwrap_or_else(|_| {
        Err(Error::RefreshFailed(
            "refresh ended without settling this call".into(),
        ))
    })
}
