//! Prometheus export of simulation counters.

use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use thiserror::Error;

use crate::sim::stats::CacheStats;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Metrics text is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Per-run counters labelled by policy and nominal cache size.
pub struct SimMetrics {
    registry: Registry,
    requests: IntCounterVec,
    misses: IntCounterVec,
    request_bytes: IntCounterVec,
    miss_bytes: IntCounterVec,
    evictions: IntCounterVec,
    miss_ratio: GaugeVec,
}

const LABELS: &[&str] = &["policy", "cache_size"];

impl SimMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("evict_sim_requests_total", "Requests replayed"),
            LABELS,
        )?;
        registry.register(Box::new(requests.clone()))?;

        let misses = IntCounterVec::new(
            Opts::new("evict_sim_misses_total", "Requests that missed"),
            LABELS,
        )?;
        registry.register(Box::new(misses.clone()))?;

        let request_bytes = IntCounterVec::new(
            Opts::new("evict_sim_request_bytes_total", "Bytes requested"),
            LABELS,
        )?;
        registry.register(Box::new(request_bytes.clone()))?;

        let miss_bytes = IntCounterVec::new(
            Opts::new("evict_sim_miss_bytes_total", "Bytes that missed"),
            LABELS,
        )?;
        registry.register(Box::new(miss_bytes.clone()))?;

        let evictions = IntCounterVec::new(
            Opts::new("evict_sim_evictions_total", "Objects evicted"),
            LABELS,
        )?;
        registry.register(Box::new(evictions.clone()))?;

        let miss_ratio = GaugeVec::new(
            Opts::new("evict_sim_miss_ratio", "Final request miss ratio"),
            LABELS,
        )?;
        registry.register(Box::new(miss_ratio.clone()))?;

        Ok(Self {
            registry,
            requests,
            misses,
            request_bytes,
            miss_bytes,
            evictions,
            miss_ratio,
        })
    }

    /// Add the counters of one finished run.
    pub fn record(&self, policy: &str, stats: &CacheStats) {
        let size = stats.cache_size.to_string();
        let labels = [policy, size.as_str()];
        self.requests.with_label_values(&labels).inc_by(stats.n_req);
        self.misses.with_label_values(&labels).inc_by(stats.n_miss);
        self.request_bytes
            .with_label_values(&labels)
            .inc_by(stats.n_req_byte);
        self.miss_bytes
            .with_label_values(&labels)
            .inc_by(stats.n_miss_byte);
        self.evictions
            .with_label_values(&labels)
            .inc_by(stats.n_evictions);
        self.miss_ratio
            .with_label_values(&labels)
            .set(stats.miss_ratio());
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
