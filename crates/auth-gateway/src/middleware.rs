//! Request middleware pipeline
//!
//! Middleware runs synchronously on every outgoing call before it reaches the
//! transport, in registration order. It cannot fail: a stage that cannot
//! apply itself logs and leaves the call as it was.

use std::str::FromStr;
use std::sync::Arc;

use common::Secret;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use session_auth::CredentialStore;
use tracing::warn;

use crate::request::ApiRequest;

/// One stage of the request pipeline.
pub trait RequestMiddleware: Send + Sync {
    /// Identifier for logging
    fn name(&self) -> &str;

    /// Modify the outgoing call in place.
    fn apply(&self, request: &mut ApiRequest);
}

/// Ordered list of middleware applied to each call.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn RequestMiddleware>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Arc<dyn RequestMiddleware>) {
        self.stages.push(stage);
    }

    pub fn apply(&self, request: &mut ApiRequest) {
        for stage in &self.stages {
            stage.apply(request);
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }
}

/// Write `Authorization: Bearer <token>` into the headers.
///
/// Returns false (and removes any stale authorization) when the token is not
/// a legal header value.
pub fn set_bearer(headers: &mut HeaderMap, access_token: &Secret<String>) -> bool {
    match HeaderValue::from_str(&format!("Bearer {}", access_token.expose())) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
            true
        }
        Err(e) => {
            warn!(error = %e, "access token is not a valid header value, sending unauthenticated");
            headers.remove(AUTHORIZATION);
            false
        }
    }
}

/// Attaches the stored access token to every call.
///
/// Without a stored pair the call goes out unauthenticated, even if the
/// caller set its own authorization header.
pub struct BearerAuth {
    store: Arc<CredentialStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }
}

impl RequestMiddleware for BearerAuth {
    fn name(&self) -> &str {
        "bearer-auth"
    }

    fn apply(&self, request: &mut ApiRequest) {
        match self.store.access_token() {
            Some(access_token) => {
                set_bearer(request.headers_mut(), &access_token);
            }
            None => {
                request.headers_mut().remove(AUTHORIZATION);
            }
        }
    }
}

/// Header injection rule (name + value pair from config).
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

/// Static header injection. Never touches the authorization header, which
/// belongs to `BearerAuth`.
pub struct StaticHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl StaticHeaders {
    /// Validate the configured rules, skipping (and logging) the bad ones.
    pub fn new(rules: &[HeaderInjection]) -> Self {
        let mut headers = Vec::with_capacity(rules.len());
        for rule in rules {
            let name = match HeaderName::from_str(&rule.name) {
                Ok(n) => n,
                Err(e) => {
                    warn!(header = %rule.name, error = %e, "skipping invalid header name");
                    continue;
                }
            };
            if name == AUTHORIZATION {
                warn!(header = %rule.name, "refusing to inject authorization header");
                continue;
            }
            let value = match HeaderValue::from_str(&rule.value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(header = %rule.name, error = %e, "skipping invalid header value");
                    continue;
                }
            };
            headers.push((name, value));
        }
        Self { headers }
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl RequestMiddleware for StaticHeaders {
    fn name(&self) -> &str {
        "static-headers"
    }

    fn apply(&self, request: &mut ApiRequest) {
        for (name, value) in &self.headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }
    }
}
