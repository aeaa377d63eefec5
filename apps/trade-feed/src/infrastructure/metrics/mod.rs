//! Prometheus Metrics Module
//!
//! Exposes client metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Push transport**: frames received, events dispatched, decode failures
//! - **Connection**: state gauge, transport and protocol faults, reconnects
//! - **Consumers**: fetches issued, coalesced, stale, failed, and latency
//! - **Feed**: buffer size and active topics
//!
//! Recording is a no-op until [`init_metrics`] installs the recorder, so the
//! library and its tests never need one.
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the status server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls return the same handle.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Push transport
    describe_counter!(
        "trade_feed_frames_received_total",
        "Total MESSAGE frames received from the broker"
    );
    describe_counter!(
        "trade_feed_events_dispatched_total",
        "Total listener invocations for decoded events"
    );
    describe_counter!(
        "trade_feed_decode_failures_total",
        "Total frame bodies rejected by the decoder"
    );

    // Connection
    describe_gauge!(
        "trade_feed_connection_state",
        "Connection state (0=disconnected 1=connecting 2=connected 3=error 4=failed)"
    );
    describe_counter!(
        "trade_feed_transport_faults_total",
        "Total transport faults by kind"
    );
    describe_counter!(
        "trade_feed_protocol_faults_total",
        "Total ERROR frames received"
    );
    describe_counter!(
        "trade_feed_reconnect_attempts_total",
        "Total session attempts after the first"
    );

    // Consumers
    describe_counter!(
        "trade_feed_fetches_issued_total",
        "Total authoritative fetches started"
    );
    describe_counter!(
        "trade_feed_fetches_coalesced_total",
        "Total invalidations folded into a trailing refresh"
    );
    describe_counter!(
        "trade_feed_stale_responses_total",
        "Total fetch results discarded as stale or post-teardown"
    );
    describe_counter!(
        "trade_feed_fetch_failures_total",
        "Total fetches that failed"
    );
    describe_histogram!(
        "trade_feed_fetch_duration_seconds",
        "Authoritative fetch latency"
    );

    // Feed
    describe_gauge!("trade_feed_feed_size", "Events held in the feed buffer");
    describe_gauge!(
        "trade_feed_active_topics",
        "Topics with at least one local listener"
    );
}

// =============================================================================
// Metric Labels
// =============================================================================

/// Kinds of transport fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFaultKind {
    /// Socket could not be opened.
    Connect,
    /// No `CONNECTED` within the handshake timeout.
    HandshakeTimeout,
    /// No inbound traffic within the heart-beat window.
    HeartbeatTimeout,
    /// Remote side closed the socket.
    RemoteClose,
    /// Read or write failed on an open socket.
    Io,
    /// The handshake reply was not a STOMP frame.
    Framing,
}

impl TransportFaultKind {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::HandshakeTimeout => "handshake_timeout",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::RemoteClose => "remote_close",
            Self::Io => "io",
            Self::Framing => "framing",
        }
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a `MESSAGE` frame received.
pub fn record_frame_received() {
    counter!("trade_feed_frames_received_total").increment(1);
}

/// Record listener invocations for one event.
pub fn record_events_dispatched(topic: &str, count: u64) {
    counter!(
        "trade_feed_events_dispatched_total",
        "topic" => topic.to_string()
    )
    .increment(count);
}

/// Record a rejected frame body.
pub fn record_decode_failure() {
    counter!("trade_feed_decode_failures_total").increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("trade_feed_connection_state").set(f64::from(state.code()));
}

/// Record a transport fault.
pub fn record_transport_fault(kind: TransportFaultKind) {
    counter!(
        "trade_feed_transport_faults_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a protocol fault.
pub fn record_protocol_fault() {
    counter!("trade_feed_protocol_faults_total").increment(1);
}

/// Record a session attempt after the first.
pub fn record_reconnect_attempt() {
    counter!("trade_feed_reconnect_attempts_total").increment(1);
}

/// Record a fetch started by `consumer`.
pub fn record_fetch_issued(consumer: &'static str) {
    counter!("trade_feed_fetches_issued_total", "consumer" => consumer).increment(1);
}

/// Record an invalidation folded into a trailing refresh.
pub fn record_fetch_coalesced(consumer: &'static str) {
    counter!("trade_feed_fetches_coalesced_total", "consumer" => consumer).increment(1);
}

/// Record a discarded fetch result.
pub fn record_stale_response(consumer: &'static str) {
    counter!("trade_feed_stale_responses_total", "consumer" => consumer).increment(1);
}

/// Record a failed fetch.
pub fn record_fetch_failure(consumer: &'static str) {
    counter!("trade_feed_fetch_failures_total", "consumer" => consumer).increment(1);
}

/// Record fetch latency.
pub fn record_fetch_duration(consumer: &'static str, duration: Duration) {
    histogram!(
        "trade_feed_fetch_duration_seconds",
        "consumer" => consumer
    )
    .record(duration.as_secs_f64());
}

/// Update the feed buffer size gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_feed_size(len: usize) {
    gauge!("trade_feed_feed_size").set(len as f64);
}

/// Update the active topic gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_topics(count: usize) {
    gauge!("trade_feed_active_topics").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_fault_kind_as_str() {
        assert_eq!(TransportFaultKind::Connect.as_str(), "connect");
        assert_eq!(
            TransportFaultKind::HandshakeTimeout.as_str(),
            "handshake_timeout"
        );
        assert_eq!(
            TransportFaultKind::HeartbeatTimeout.as_str(),
            "heartbeat_timeout"
        );
        assert_eq!(TransportFaultKind::RemoteClose.as_str(), "remote_close");
        assert_eq!(TransportFaultKind::Io.as_str(), "io");
        assert_eq!(TransportFaultKind::Framing.as_str(), "framing");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_received();
        record_fetch_issued("portfolio");
        set_connection_state(ConnectionState::Connected);
        record_fetch_duration("portfolio", Duration::from_millis(5));
    }
}
