//! Gateway metrics
//!
//! Recorded through the `metrics` facade; the embedding binary decides where
//! they go (the session proxy installs a Prometheus recorder).
//!
//! - `gateway_token_refresh_total` (counter): label `outcome` (`success`, `failure`)
//! - `gateway_calls_queued_total` (counter): calls parked behind an in-flight refresh
//! - `gateway_calls_replayed_total` (counter): label `outcome` (`completed`, `expired`, `error`)
//! - `gateway_session_teardown_total` (counter): sessions ended by teardown

/// Record the outcome of one refresh call.
pub fn record_refresh(outcome: &'static str) {
    ::metrics::counter!("gateway_token_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a call parked in the waiting queue.
pub fn record_queued() {
    ::metrics::counter!("gateway_calls_queued_total").increment(1);
}

/// Record the outcome of one replayed call.
pub fn record_replay(outcome: &'static str) {
    ::metrics::counter!("gateway_calls_replayed_total", "outcome" => outcome).increment(1);
}

/// Record a session teardown that actually ended a session.
pub fn record_teardown() {
    ::metrics::counter!("gateway_session_teardown_total").increment(1);
}
