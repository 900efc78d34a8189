//! Transport abstraction
//!
//! The gateway never talks to an HTTP client directly. It hands a fully
//! prepared `ApiRequest` to a `Transport` and gets back an `ApiResponse` for
//! any status the server answered with. Only failures to get an answer at all
//! (connect errors, timeouts) are errors.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::request::{ApiRequest, ApiResponse};

/// Boxed future returned by `Transport::execute`.
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;

/// Sends one call and returns whatever the server answered.
pub trait Transport: Send + Sync {
    fn execute(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// `reqwest`-backed transport joining each call's path onto a base URL.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    /// Absolute URL for a path (which may carry a query string).
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            let url = self.url_for(request.path());
            let mut builder = self
                .client
                .request(request.method().clone(), &url)
                .headers(request.headers().clone())
                .timeout(self.timeout);
            if let Some(body) = request.body_bytes() {
                builder = builder.body(body.clone());
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    Error::Http(format!(
                        "{} {url} timed out after {}s",
                        request.method(),
                        self.timeout.as_secs()
                    ))
                } else {
                    Error::Http(format!("{} {url}: {e}", request.method()))
                }
            })?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| Error::Http(format!("reading response body from {url}: {e}")))?;

            debug!(method = %request.method(), url, status = status.as_u16(), "call completed");
            Ok(ApiResponse::new(status, headers, body))
        })
    }
}
