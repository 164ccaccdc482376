//! Prometheus Metrics Module
//!
//! Application metrics recorded through the `metrics` facade. Recording is a
//! no-op until a recorder is installed, so library users who do not call
//! [`init_metrics`] pay nothing.
//!
//! # Metrics Categories
//!
//! - **Sessions**: opened/closed counts, lifetime, resets, transport failures
//! - **Messages**: messages forwarded to consumers, payloads dropped by decoding
//! - **HTTP**: REST requests by endpoint and outcome

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

static METRICS_INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Install the Prometheus exporter, serving `/metrics` on `port`.
///
/// Calling this more than once keeps the first listener.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn init_metrics(port: u16) -> Result<SocketAddr, BuildError> {
    if let Some(addr) = METRICS_INSTALLED.get() {
        return Ok(*addr);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    register_metrics();
    Ok(*METRICS_INSTALLED.get_or_init(|| addr))
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "coincap_stream_sessions_opened_total",
        "Stream sessions that became live"
    );
    describe_counter!(
        "coincap_stream_sessions_closed_total",
        "Stream sessions closed, by reason"
    );
    describe_histogram!(
        "coincap_stream_session_lifetime_seconds",
        "Time from a session going live to its close"
    );
    describe_counter!(
        "coincap_stream_resets_total",
        "Caller-requested reconnects"
    );
    describe_counter!(
        "coincap_stream_transport_failures_total",
        "Live sessions lost to disconnects or protocol errors"
    );
    describe_counter!(
        "coincap_stream_messages_forwarded_total",
        "Decoded messages handed to consumers"
    );
    describe_counter!(
        "coincap_stream_decode_failures_total",
        "Payloads dropped because they could not be decoded"
    );
    describe_counter!(
        "coincap_http_requests_total",
        "REST requests by endpoint and outcome"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a session going live.
pub fn record_session_opened(channel: &str) {
    counter!(
        "coincap_stream_sessions_opened_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// Record a session being closed and how long it lived.
pub fn record_session_closed(channel: &str, reason: &'static str, lifetime: Duration) {
    counter!(
        "coincap_stream_sessions_closed_total",
        "channel" => channel.to_string(),
        "reason" => reason
    )
    .increment(1);
    histogram!(
        "coincap_stream_session_lifetime_seconds",
        "channel" => channel.to_string()
    )
    .record(lifetime.as_secs_f64());
}

/// Record a caller-requested reconnect.
pub fn record_reset(channel: &str) {
    counter!(
        "coincap_stream_resets_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// Record a live session lost to the transport.
pub fn record_transport_failure(channel: &str, kind: &'static str) {
    counter!(
        "coincap_stream_transport_failures_total",
        "channel" => channel.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// Record a message handed to the consumer sink.
pub fn record_message_forwarded(channel: &str) {
    counter!(
        "coincap_stream_messages_forwarded_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// Record a payload dropped by the decoder.
pub fn record_decode_failure(channel: &str) {
    counter!(
        "coincap_stream_decode_failures_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// Outcome label for REST requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// 2xx with a decodable body.
    Success,
    /// Retried after a transient failure.
    Retried,
    /// Gave up.
    Failed,
}

impl RequestOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Retried => "retried",
            Self::Failed => "failed",
        }
    }
}

/// Record a REST request attempt.
pub fn record_http_request(endpoint: &str, outcome: RequestOutcome) {
    counter!(
        "coincap_http_requests_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_outcome_as_str() {
        assert_eq!(RequestOutcome::Success.as_str(), "success");
        assert_eq!(RequestOutcome::Retried.as_str(), "retried");
        assert_eq!(RequestOutcome::Failed.as_str(), "failed");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_session_opened("trades");
        record_session_closed("trades", "stop", Duration::from_millis(5));
        record_decode_failure("trades");
        record_http_request("global", RequestOutcome::Success);
    }
}
