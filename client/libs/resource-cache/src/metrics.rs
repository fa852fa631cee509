//! Cache metrics for observability

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    joined: CounterVec,
    writes: CounterVec,
    discarded: CounterVec,
    invalidations: CounterVec,
    reconciles: CounterVec,
    errors: CounterVec,
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: CounterVec::new(
                Opts::new("sync_cache_hits_total", "Reads served from a fresh entry"),
                &["resource"],
            )
            .expect("valid metric definition"),
            misses: CounterVec::new(
                Opts::new("sync_cache_misses_total", "Reads that started a fetch"),
                &["resource"],
            )
            .expect("valid metric definition"),
            joined: CounterVec::new(
                Opts::new(
                    "sync_cache_joined_total",
                    "Reads that joined an in-flight fetch",
                ),
                &["resource"],
            )
            .expect("valid metric definition"),
            writes: CounterVec::new(
                Opts::new("sync_cache_writes_total", "Fetch results applied"),
                &["resource"],
            )
            .expect("valid metric definition"),
            discarded: CounterVec::new(
                Opts::new(
                    "sync_cache_discarded_total",
                    "Fetch results discarded because newer data was already applied",
                ),
                &["resource"],
            )
            .expect("valid metric definition"),
            invalidations: CounterVec::new(
                Opts::new("sync_cache_invalidations_total", "Total cache invalidations"),
                &["resource"],
            )
            .expect("valid metric definition"),
            reconciles: CounterVec::new(
                Opts::new(
                    "sync_cache_reconciles_total",
                    "Optimistic updates reconciled by refetch",
                ),
                &["resource"],
            )
            .expect("valid metric definition"),
            errors: CounterVec::new(
                Opts::new("sync_cache_errors_total", "Total cache errors"),
                &["resource", "error_type"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.joined.clone()))?;
        registry.register(Box::new(self.writes.clone()))?;
        registry.register(Box::new(self.discarded.clone()))?;
        registry.register(Box::new(self.invalidations.clone()))?;
        registry.register(Box::new(self.reconciles.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Cache metrics wrapper, labelled by resource name
#[derive(Clone, Debug)]
pub struct CacheMetrics {
    resource: String,
}

impl CacheMetrics {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
        }
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self) {
        get_metrics().hits.with_label_values(&[self.resource.as_str()]).inc();
    }

    pub fn record_miss(&self) {
        get_metrics().misses.with_label_values(&[self.resource.as_str()]).inc();
    }

    pub fn record_joined(&self) {
        get_metrics().joined.with_label_values(&[self.resource.as_str()]).inc();
    }

    pub fn record_write(&self) {
        get_metrics().writes.with_label_values(&[self.resource.as_str()]).inc();
    }

    pub fn record_discarded(&self) {
        get_metrics()
            .discarded
            .with_label_values(&[self.resource.as_str()])
            .inc();
    }

    pub fn record_invalidation(&self) {
        get_metrics()
            .invalidations
            .with_label_values(&[self.resource.as_str()])
            .inc();
    }

    pub fn record_reconcile(&self) {
        get_metrics()
            .reconciles
            .with_label_values(&[self.resource.as_str()])
            .inc();
    }

    pub fn record_error(&self, error_type: &str) {
        get_metrics()
            .errors
            .with_label_values(&[self.resource.as_str(), error_type])
            .inc();
    }
}
