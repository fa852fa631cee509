//! Realtime link metrics for observability

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<LinkMetricsInner> = OnceLock::new();

struct LinkMetricsInner {
    connects: IntCounter,
    reconnect_attempts: IntCounter,
    auth_failures: IntCounter,
    frames_received: IntCounter,
    frames_sent: IntCounter,
    frames_dropped: IntCounterVec,
}

impl LinkMetricsInner {
    fn new() -> Self {
        Self {
            connects: IntCounter::new(
                "sync_link_connects_total",
                "Successful realtime connections",
            )
            .expect("valid metric definition"),
            reconnect_attempts: IntCounter::new(
                "sync_link_reconnect_attempts_total",
                "Scheduled reconnect attempts",
            )
            .expect("valid metric definition"),
            auth_failures: IntCounter::new(
                "sync_link_auth_failures_total",
                "Connection attempts aborted by token acquisition failures",
            )
            .expect("valid metric definition"),
            frames_received: IntCounter::new(
                "sync_link_frames_received_total",
                "Inbound frames routed to subscribers",
            )
            .expect("valid metric definition"),
            frames_sent: IntCounter::new("sync_link_frames_sent_total", "Outbound frames queued")
                .expect("valid metric definition"),
            frames_dropped: IntCounterVec::new(
                Opts::new("sync_link_frames_dropped_total", "Inbound frames dropped"),
                &["reason"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.connects.clone()))?;
        registry.register(Box::new(self.reconnect_attempts.clone()))?;
        registry.register(Box::new(self.auth_failures.clone()))?;
        registry.register(Box::new(self.frames_received.clone()))?;
        registry.register(Box::new(self.frames_sent.clone()))?;
        registry.register(Box::new(self.frames_dropped.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static LinkMetricsInner {
    METRICS.get_or_init(LinkMetricsInner::new)
}

#[derive(Clone, Debug, Default)]
pub struct LinkMetrics;

impl LinkMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_connect(&self) {
        get_metrics().connects.inc();
    }

    pub fn record_reconnect_attempt(&self) {
        get_metrics().reconnect_attempts.inc();
    }

    pub fn record_auth_failure(&self) {
        get_metrics().auth_failures.inc();
    }

    pub fn record_frame_received(&self) {
        get_metrics().frames_received.inc();
    }

    pub fn record_frame_sent(&self) {
        get_metrics().frames_sent.inc();
    }

    pub fn record_frame_dropped(&self, reason: &str) {
        get_metrics().frames_dropped.with_label_values(&[reason]).inc();
    }
}
