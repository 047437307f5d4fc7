//! Prometheus metrics for the stream gateway.
//!
//! Exposed on `/metrics` in text format. Registered once in the global
//! default registry on first use.

use once_cell::sync::Lazy;
use prometheus::{
    opts, register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

pub struct StreamMetrics {
    pub streams_active: IntGauge,
    pub streams_total: IntCounter,
    pub upstream_failures_total: IntCounterVec,
    pub fallback_events_total: IntCounter,
    pub relayed_bytes_total: IntCounter,
}

pub static STREAM_METRICS: Lazy<StreamMetrics> = Lazy::new(StreamMetrics::register);

impl StreamMetrics {
    fn register() -> Self {
        let streams_active = register_int_gauge!(opts!(
            "notify_gateway_streams_active",
            "Client streams currently open"
        ))
        .expect("failed to register notify_gateway_streams_active");

        let streams_total = register_int_counter!(opts!(
            "notify_gateway_streams_total",
            "Client streams opened since start"
        ))
        .expect("failed to register notify_gateway_streams_total");

        let upstream_failures_total = register_int_counter_vec!(
            opts!(
                "notify_gateway_upstream_failures_total",
                "Upstream stream failures by phase"
            ),
            &["phase"]
        )
        .expect("failed to register notify_gateway_upstream_failures_total");

        let fallback_events_total = register_int_counter!(opts!(
            "notify_gateway_fallback_events_total",
            "Placeholder events sent because the upstream was unreachable"
        ))
        .expect("failed to register notify_gateway_fallback_events_total");

        let relayed_bytes_total = register_int_counter!(opts!(
            "notify_gateway_relayed_bytes_total",
            "Upstream body bytes relayed to clients"
        ))
        .expect("failed to register notify_gateway_relayed_bytes_total");

        Self {
            streams_active,
            streams_total,
            upstream_failures_total,
            fallback_events_total,
            relayed_bytes_total,
        }
    }

    pub fn upstream_failure(&self, phase: &str) {
        self.upstream_failures_total.with_label_values(&[phase]).inc();
    }
}

/// Tracks one open client stream. The active gauge is decremented on drop,
/// so it stays correct however the relay task exits.
pub struct StreamGuard(());

impl StreamGuard {
    pub fn open() -> Self {
        STREAM_METRICS.streams_total.inc();
        STREAM_METRICS.streams_active.inc();
        Self(())
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        STREAM_METRICS.streams_active.dec();
    }
}

/// Encode all registered metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}
