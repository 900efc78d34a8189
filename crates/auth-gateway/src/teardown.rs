//! Session teardown and the session signal
//!
//! Teardown empties the credential store and flips the process-wide session
//! signal to `Unauthenticated`. The signal is a `watch` channel, so routing or
//! guard code can await the change, and it only changes on an actual
//! transition: tearing down twice is observably the same as tearing down once.

use std::sync::Arc;

use session_auth::CredentialStore;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::metrics;

/// Whether the process currently holds a usable session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Authenticated,
    Unauthenticated,
}

impl SessionState {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Authenticated => "authenticated",
            SessionState::Unauthenticated => "unauthenticated",
        }
    }
}

/// Clears credentials and broadcasts the end of the session.
#[derive(Clone)]
pub struct SessionTeardown {
    store: Arc<CredentialStore>,
    signal: Arc<watch::Sender<SessionState>>,
}

impl SessionTeardown {
    /// The initial signal reflects whether the store was rehydrated with a pair.
    pub fn new(store: Arc<CredentialStore>) -> Self {
        let initial = if store.is_empty() {
            SessionState::Unauthenticated
        } else {
            SessionState::Authenticated
        };
        let (signal, _) = watch::channel(initial);
        Self {
            store,
            signal: Arc::new(signal),
        }
    }

    /// Subscribe to session transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.signal.subscribe()
    }

    pub fn current(&self) -> SessionState {
        *self.signal.borrow()
    }

    /// Flip the signal to `Authenticated` after a sign-in. Returns whether it changed.
    pub fn mark_authenticated(&self) -> bool {
        self.transition(SessionState::Authenticated)
    }

    /// Empty the credential store and signal `Unauthenticated`.
    ///
    /// Returns whether this call ended a session. A failure to remove the
    /// persisted file is logged; the in-memory pair is gone regardless.
    pub async fn clear(&self) -> bool {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to remove persisted credentials");
        }
        let ended = self.transition(SessionState::Unauthenticated);
        if ended {
            metrics::record_teardown();
            info!("session cleared, signalling unauthenticated");
        }
        ended
    }

    fn transition(&self, next: SessionState) -> bool {
        self.signal.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        })
    }
}
