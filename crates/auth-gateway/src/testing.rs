//! In-process mock of the platform API for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use session_auth::REFRESH_TOKEN_PATH;
use tokio::sync::watch;

use crate::error::Error;
use crate::request::{ApiRequest, ApiResponse};
use crate::transport::{Transport, TransportFuture};

/// How the mock answers the refresh endpoint.
#[derive(Debug, Clone, Copy)]
pub enum RefreshReply {
    /// 200 with this access/refresh pair
    Tokens(&'static str, &'static str),
    /// Bare status with an empty body
    Status(u16),
    /// 200 with a body that is not a token pair
    Garbage,
    /// Never answer
    Hang,
    /// Fail at the transport level
    Unreachable,
}

/// Mock API: accepts exactly one bearer token, rejects everything else with 401.
pub struct MockBackend {
    valid_token: String,
    statuses: HashMap<String, u16>,
    refresh: RefreshReply,
    gate: watch::Sender<bool>,
    rejections: watch::Sender<usize>,
    calls: Mutex<Vec<(String, Option<String>)>>,
    refresh_bodies: Mutex<Vec<serde_json::Value>>,
}

impl MockBackend {
    pub fn new(valid_token: &str) -> Self {
        Self {
            valid_token: valid_token.to_string(),
            statuses: HashMap::new(),
            refresh: RefreshReply::Status(500),
            gate: watch::Sender::new(true),
            rejections: watch::Sender::new(0),
            calls: Mutex::new(Vec::new()),
            refresh_bodies: Mutex::new(Vec::new()),
        }
    }

    /// Answer authorized calls to `path` with `status` instead of 200.
    pub fn with_status(mut self, path: &str, status: u16) -> Self {
        self.statuses.insert(path.to_string(), status);
        self
    }

    pub fn with_refresh(mut self, reply: RefreshReply) -> Self {
        self.refresh = reply;
        self
    }

    /// Hold refresh answers until `release_refresh()`.
    pub fn gated(self) -> Self {
        self.gate.send_replace(false);
        self
    }

    pub fn release_refresh(&self) {
        self.gate.send_replace(true);
    }

    /// Wait until at least `n` calls were rejected with 401.
    pub async fn wait_for_rejections(&self, n: usize) {
        let mut rx = self.rejections.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_bodies.lock().unwrap().len()
    }

    pub fn refresh_bodies(&self) -> Vec<serde_json::Value> {
        self.refresh_bodies.lock().unwrap().clone()
    }

    /// Non-refresh calls as (path, authorization header).
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .count()
    }

    async fn answer_refresh(&self, request: ApiRequest) -> crate::Result<ApiResponse> {
        let body = request
            .body_bytes()
            .map(|b| serde_json::from_slice(b).unwrap_or(serde_json::Value::Null))
            .unwrap_or(serde_json::Value::Null);
        self.refresh_bodies.lock().unwrap().push(body);

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        match self.refresh {
            RefreshReply::Tokens(access, refresh) => Ok(ApiResponse::new(
                StatusCode::OK,
                HeaderMap::new(),
                serde_json::json!({ "accessToken": access, "refreshToken": refresh }).to_string(),
            )),
            RefreshReply::Status(code) => Ok(ApiResponse::new(
                StatusCode::from_u16(code).unwrap(),
                HeaderMap::new(),
                "",
            )),
            RefreshReply::Garbage => Ok(ApiResponse::new(
                StatusCode::OK,
                HeaderMap::new(),
                "<html>maintenance</html>",
            )),
            RefreshReply::Hang => std::future::pending().await,
            RefreshReply::Unreachable => Err(Error::Http("connection refused".into())),
        }
    }

    fn answer_call(&self, request: ApiRequest) -> ApiResponse {
        let path = request.path().to_string();
        let authorization = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.calls
            .lock()
            .unwrap()
            .push((path.clone(), authorization));

        if request.bearer_token() != Some(self.valid_token.as_str()) {
            self.rejections.send_modify(|count| *count += 1);
            return ApiResponse::new(StatusCode::UNAUTHORIZED, HeaderMap::new(), "token expired");
        }

        let status = self.statuses.get(&path).copied().unwrap_or(200);
        ApiResponse::new(StatusCode::from_u16(status).unwrap(), HeaderMap::new(), path)
    }
}

impl Transport for MockBackend {
    fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            if request.path() == REFRESH_TOKEN_PATH {
                self.answer_refresh(request).await
            } else {
                Ok(self.answer_call(request))
            }
        })
    }
}
