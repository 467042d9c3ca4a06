//! Metrics collection and monitoring for the store.
//!
//! Uses Prometheus the way the rest of the ecosystem does: one global
//! registry, typed counters/histograms registered once and reused across
//! calls.

use crate::Result;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter,
    IntGauge, Registry,
};
use std::time::Instant;

/// Global metrics registry.
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Version-store operation counters (spec.md §4.3–§4.6).
pub struct VersionStoreMetrics {
    /// Total versions written.
    pub versions_written: IntCounter,
    /// Total versions read (any `as_of` mode).
    pub versions_read: IntCounter,
    /// Total new segments written (i.e. that did not already exist).
    pub segments_written: IntCounter,
    /// Total segments deduplicated against an existing `(symbol, sha)`.
    pub segments_deduped: IntCounter,
    /// Total versions deleted by pruning.
    pub versions_pruned: IntCounter,
    /// Total snapshots created.
    pub snapshots_created: IntCounter,
    /// Total writes rejected by `QuotaExceeded`.
    pub quota_rejections: IntCounter,
    /// Total symbols removed via `delete`.
    pub symbols_deleted: IntCounter,
}

/// Tick-store operation counters (spec.md §4.9–§4.10).
pub struct TickStoreMetrics {
    /// Total tick chunks written.
    pub chunks_written: IntCounter,
    /// Total rows ingested across all writes.
    pub rows_written: IntCounter,
    /// Total rows dropped by a top-level store's `UnroutedPolicy::Drop`.
    pub rows_dropped_unrouted: IntCounter,
}

/// Operation latency histograms.
pub struct LatencyMetrics {
    /// Duration of `write` calls, version store and tick store alike.
    pub write_duration: Histogram,
    /// Duration of `read` calls.
    pub read_duration: Histogram,
}

/// Resource gauges.
pub struct ResourceMetrics {
    /// Number of libraries currently registered with the hub.
    pub libraries: IntGauge,
    /// Most recently sampled storage size, per library, summed.
    pub storage_bytes_sampled: IntGauge,
}

/// Centralized metrics collection.
pub struct Metrics {
    /// Version-store counters.
    pub version_store: VersionStoreMetrics,
    /// Tick-store counters.
    pub tick_store: TickStoreMetrics,
    /// Latency histograms.
    pub latency: LatencyMetrics,
    /// Resource gauges.
    pub resources: ResourceMetrics,
}

impl Metrics {
    /// Create a new metrics instance, registering all collectors.
    pub fn new() -> Result<Self> {
        Ok(Self {
            version_store: VersionStoreMetrics::new()?,
            tick_store: TickStoreMetrics::new()?,
            latency: LatencyMetrics::new()?,
            resources: ResourceMetrics::new()?,
        })
    }

    /// The global metrics instance, lazily registered on first access.
    pub fn global() -> &'static Metrics {
        static INSTANCE: Lazy<Metrics> = Lazy::new(|| Metrics::new().expect("failed to initialize metrics"));
        &INSTANCE
    }
}

impl VersionStoreMetrics {
    fn new() -> Result<Self> {
        Ok(Self {
            versions_written: register_int_counter!("arctic_versions_written_total", "Total versions written")?,
            versions_read: register_int_counter!("arctic_versions_read_total", "Total versions read")?,
            segments_written: register_int_counter!(
                "arctic_segments_written_total",
                "Total new segments written"
            )?,
            segments_deduped: register_int_counter!(
                "arctic_segments_deduped_total",
                "Total segments deduplicated against an existing sha"
            )?,
            versions_pruned: register_int_counter!("arctic_versions_pruned_total", "Total versions pruned")?,
            snapshots_created: register_int_counter!(
                "arctic_snapshots_created_total",
                "Total snapshots created"
            )?,
            quota_rejections: register_int_counter!(
                "arctic_quota_rejections_total",
                "Total writes rejected for exceeding quota"
            )?,
            symbols_deleted: register_int_counter!("arctic_symbols_deleted_total", "Total symbols deleted")?,
        })
    }
}

impl TickStoreMetrics {
    fn new() -> Result<Self> {
        Ok(Self {
            chunks_written: register_int_counter!("arctic_tick_chunks_written_total", "Total tick chunks written")?,
            rows_written: register_int_counter!("arctic_tick_rows_written_total", "Total tick rows ingested")?,
            rows_dropped_unrouted: register_int_counter!(
                "arctic_tick_rows_dropped_unrouted_total",
                "Total rows dropped by a top-level store because no routing interval covered them"
            )?,
        })
    }
}

impl LatencyMetrics {
    fn new() -> Result<Self> {
        Ok(Self {
            write_duration: register_histogram!(
                "arctic_write_duration_seconds",
                "Duration of write operations in seconds",
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
            )?,
            read_duration: register_histogram!(
                "arctic_read_duration_seconds",
                "Duration of read operations in seconds",
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
            )?,
        })
    }
}

impl ResourceMetrics {
    fn new() -> Result<Self> {
        Ok(Self {
            libraries: register_int_gauge!("arctic_libraries", "Number of libraries registered with the hub")?,
            storage_bytes_sampled: register_int_gauge!(
                "arctic_storage_bytes_sampled",
                "Most recently sampled storage size in bytes, summed across libraries"
            )?,
        })
    }
}

/// Measures and records the duration of an operation against a histogram.
pub struct Timer {
    start: Instant,
    histogram: Histogram,
}

impl Timer {
    /// Start a new timer against the given histogram.
    pub fn start(histogram: Histogram) -> Self {
        Self {
            start: Instant::now(),
            histogram,
        }
    }

    /// Record the elapsed time and consume the timer.
    pub fn finish(self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Times a block of code against a histogram metric.
#[macro_export]
macro_rules! time_operation {
    ($metric:expr, $body:expr) => {{
        let timer = $crate::metrics::Timer::start($metric.clone());
        let result = $body;
        timer.finish();
        result
    }};
}

/// Initialize the metrics registry (registers collectors on first access).
pub fn init_registry() {
    let _ = Metrics::global();
}

/// The Prometheus registry backing these collectors.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Render all collected metrics in Prometheus text exposition format.
pub fn collect_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = registry().gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
