//! Waiting queue for calls parked behind an in-flight refresh
//!
//! Each parked call keeps its original request and the sending half of a
//! oneshot channel; its caller awaits the receiving half. Both drains consume
//! the queue, so every parked call is completed exactly once.

use std::collections::VecDeque;

use common::Secret;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};
use crate::replay::ReplayDispatcher;
use crate::request::{ApiRequest, ApiResponse};

/// Receiving half handed back to a parked caller.
pub type Reply = oneshot::Receiver<Result<ApiResponse>>;

/// A suspended call waiting for the outcome of a refresh.
pub struct PendingCall {
    request: ApiRequest,
    reply: oneshot::Sender<Result<ApiResponse>>,
}

impl PendingCall {
    /// Create a pending call and the receiver its caller should await.
    pub fn new(request: ApiRequest) -> (Self, Reply) {
        let (reply, rx) = oneshot::channel();
        (Self { request, reply }, rx)
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    /// Hand the outcome to the waiting caller.
    pub fn complete(self, result: Result<ApiResponse>) {
        if self.reply.send(result).is_err() {
            debug!(path = self.request.path(), "caller went away before its call completed");
        }
    }

    /// Re-issue the call with a fresh access token and complete it with the outcome.
    pub async fn replay(self, dispatcher: &ReplayDispatcher, access_token: &Secret<String>) {
        let PendingCall { request, reply } = self;
        let path = request.path().to_owned();
        let result = dispatcher.replay(request, access_token).await;
        if reply.send(result).is_err() {
            debug!(path, "caller went away before its replay completed");
        }
    }
}

/// Calls that hit an expired credential while a refresh was already running.
#[derive(Default)]
pub struct WaitingQueue {
    pending: VecDeque<PendingCall>,
}

impl WaitingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a call; the returned receiver resolves when the queue is drained.
    pub fn enqueue(&mut self, request: ApiRequest) -> Reply {
        let (call, rx) = PendingCall::new(request);
        self.pending.push_back(call);
        rx
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Replay every parked call with the new access token, in insertion order
    /// of dispatch. Each caller gets its own replay's outcome.
    pub async fn drain_with_success(self, access_token: &Secret<String>, dispatcher: &ReplayDispatcher) {
        if self.pending.is_empty() {
            return;
        }
        debug!(calls = self.pending.len(), "replaying queued calls");
        dispatcher.replay_all(self.pending, access_token).await;
    }

    /// Reject every parked call with `error`, without touching the network.
    pub fn drain_with_failure(self, error: &Error) {
        if !self.pending.is_empty() {
            debug!(calls = self.pending.len(), error = %error, "rejecting queued calls");
        }
        for call in self.pending {
            call.complete(Err(error.clone()));
        }
    }
}
