//! Authenticated API gateway for the talent platform
//!
//! Every outgoing call runs through a request middleware pipeline that
//! attaches the session's bearer token, then through the transport. A 401
//! hands the call to the refresh coordinator, which keeps at most one refresh
//! in flight, parks later failures in a waiting queue, and replays every
//! parked call once new credentials arrive.
//!
//! Call lifecycle:
//! 1. `AuthGateway::send()` applies the `middleware::Pipeline` (bearer token, static headers)
//! 2. `transport::Transport::execute()` performs the call
//! 3. Non-401 responses are returned unchanged
//! 4. A 401 goes to `coordinator::RefreshCoordinator::handle_expired()`
//! 5. The first caller refreshes; later callers wait in `queue::WaitingQueue`
//! 6. `replay::ReplayDispatcher` re-issues each call with the new token
//! 7. If refresh is impossible or fails, `teardown::SessionTeardown` signs the session out

pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod middleware;
pub mod queue;
pub mod replay;
pub mod request;
pub mod teardown;
pub mod transport;

#[cfg(test)]
mod testing;

pub use coordinator::{RefreshAction, RefreshCoordinator, RefreshEvent, RefreshState, handle_event};
pub use error::{Error, Result};
pub use gateway::{AuthGateway, DEFAULT_REFRESH_TIMEOUT, GatewayBuilder};
pub use middleware::{BearerAuth, HeaderInjection, Pipeline, RequestMiddleware, StaticHeaders};
pub use queue::{PendingCall, WaitingQueue};
pub use replay::ReplayDispatcher;
pub use request::{ApiRequest, ApiResponse};
pub use teardown::{SessionState, SessionTeardown};
pub use transport::{ReqwestTransport, Transport, TransportFuture};
