//! Prometheus metrics registry and text export for the exporter
//!
//! Two kinds of metrics end up on `/metrics`:
//!
//! * long-lived exporter metrics (fetch counters, health failures, liveness),
//!   registered once in the wrapped [`prometheus::Registry`];
//! * per-filer record metrics, produced fresh on every scrape by the
//!   registered [`ScrapeCollector`]s.
//!
//! Families coming from different collectors under the same name are merged
//! before encoding, so several filers can export `netapp_volume_total_bytes`
//! side by side.

use async_trait::async_trait;
use futures::future::join_all;
use prometheus::proto::MetricFamily;
use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{ExporterError, Result};

/// Histogram buckets for management API round trips (in seconds)
pub const FETCH_LATENCY_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0,
];

/// Source of metric families rebuilt on every scrape
#[async_trait]
pub trait ScrapeCollector: Send + Sync {
    async fn collect(&self) -> Vec<MetricFamily>;
}

/// Metrics registry shared by the HTTP server and the discovery controller
pub struct MetricsRegistry {
    /// Prometheus registry for long-lived metrics
    registry: Registry,
    /// Scrape-time collectors keyed by a unique name
    collectors: Arc<RwLock<BTreeMap<String, Arc<dyn ScrapeCollector>>>>,
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            collectors: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Register a scrape-time collector. Names must be unique.
    pub async fn register_collector(
        &self,
        name: impl Into<String>,
        collector: Arc<dyn ScrapeCollector>,
    ) -> Result<()> {
        let name = name.into();
        let mut collectors = self.collectors.write().await;
        if collectors.contains_key(&name) {
            return Err(ExporterError::AlreadyRegistered(name));
        }
        debug!("Registered scrape collector {}", name);
        collectors.insert(name, collector);
        Ok(())
    }

    /// Number of scrape-time collectors
    pub async fn collector_count(&self) -> usize {
        self.collectors.read().await.len()
    }

    /// Get the Prometheus registry
    pub fn prometheus_registry(&self) -> &Registry {
        &self.registry
    }

    /// Run every collector concurrently and merge with the registry contents
    pub async fn gather(&self) -> Vec<MetricFamily> {
        let collectors: Vec<Arc<dyn ScrapeCollector>> =
            self.collectors.read().await.values().cloned().collect();

        let mut families = self.registry.gather();
        for batch in join_all(collectors.iter().map(|c| c.collect())).await {
            families.extend(batch);
        }
        merge_families(families)
    }

    /// Export metrics in Prometheus text format
    pub async fn export_metrics(&self) -> Result<String> {
        let families = self.gather().await;
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Create and register a counter vector
    pub fn create_counter_vec(&self, name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
        let counter_vec = IntCounterVec::new(Opts::new(name, help), labels)?;
        self.registry.register(Box::new(counter_vec.clone()))?;
        Ok(counter_vec)
    }

    /// Create and register a gauge
    pub fn create_gauge(&self, name: &str, help: &str) -> Result<IntGauge> {
        let gauge = IntGauge::with_opts(Opts::new(name, help))?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    /// Create and register a gauge vector
    pub fn create_gauge_vec(&self, name: &str, help: &str, labels: &[&str]) -> Result<IntGaugeVec> {
        let gauge_vec = IntGaugeVec::new(Opts::new(name, help), labels)?;
        self.registry.register(Box::new(gauge_vec.clone()))?;
        Ok(gauge_vec)
    }

    /// Create and register a histogram vector
    pub fn create_histogram_vec(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
        buckets: Vec<f64>,
    ) -> Result<HistogramVec> {
        let opts = HistogramOpts::new(name, help).buckets(buckets);
        let histogram_vec = HistogramVec::new(opts, labels)?;
        self.registry.register(Box::new(histogram_vec.clone()))?;
        Ok(histogram_vec)
    }

    /// Register process CPU, memory and file descriptor metrics
    pub fn register_process_collector(&self) -> Result<()> {
        #[cfg(target_os = "linux")]
        {
            let collector = prometheus::process_collector::ProcessCollector::for_self();
            self.registry.register(Box::new(collector))?;
        }
        Ok(())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a gauge vector that is never registered. Scrape collectors fill one
/// per scrape and hand its families to the registry.
pub fn scrape_gauge_vec(
    name: &str,
    help: &str,
    const_labels: &HashMap<String, String>,
    labels: &[&str],
) -> Result<GaugeVec> {
    let opts = Opts::new(name, help).const_labels(const_labels.clone());
    Ok(GaugeVec::new(opts, labels)?)
}

/// Merge families sharing a name, drop empty ones and sort by name
pub fn merge_families(families: Vec<MetricFamily>) -> Vec<MetricFamily> {
    let mut merged: BTreeMap<String, MetricFamily> = BTreeMap::new();
    for mut family in families {
        if family.get_metric().is_empty() {
            continue;
        }
        match merged.get_mut(family.get_name()) {
            Some(existing) => {
                if existing.get_field_type() != family.get_field_type() {
                    warn!(
                        "Dropping metric family {} with conflicting type {:?}",
                        family.get_name(),
                        family.get_field_type()
                    );
                    continue;
                }
                for metric in family.take_metric().into_vec() {
                    existing.mut_metric().push(metric);
                }
            }
            None => {
                merged.insert(family.get_name().to_string(), family);
            }
        }
    }
    merged.into_values().collect()
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    histogram: Histogram,
}

impl Timer {
    /// Create a new timer
    pub fn new(histogram: Histogram) -> Self {
        Self {
            start: Instant::now(),
            histogram,
        }
    }

    /// Record the elapsed time and consume the timer
    pub fn finish(self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Exporter self-observation metrics, shared by every filer
#[derive(Clone)]
pub struct ExporterMetrics {
    pub fetch_attempts: IntCounterVec,
    pub fetch_failures: IntCounterVec,
    pub fetch_duration: HistogramVec,
    pub cached_records: IntGaugeVec,
    pub health_failures: IntCounterVec,
    pub filer_up: IntGaugeVec,
    pub registered_filers: IntGauge,
}

impl ExporterMetrics {
    /// Create and register the exporter metrics
    pub fn new(registry: &MetricsRegistry) -> Result<Self> {
        Ok(Self {
            fetch_attempts: registry.create_counter_vec(
                "netapp_fetch_attempts_total",
                "Total number of fetches against the management API",
                &["filer", "resource"],
            )?,
            fetch_failures: registry.create_counter_vec(
                "netapp_fetch_failures_total",
                "Total number of failed fetches against the management API",
                &["filer", "resource"],
            )?,
            fetch_duration: registry.create_histogram_vec(
                "netapp_fetch_duration_seconds",
                "Duration of fetches against the management API",
                &["filer", "resource"],
                FETCH_LATENCY_BUCKETS.to_vec(),
            )?,
            cached_records: registry.create_gauge_vec(
                "netapp_cached_records",
                "Number of records held by a background-refreshed cache",
                &["filer", "resource"],
            )?,
            health_failures: registry.create_counter_vec(
                "netapp_filer_health_failures_total",
                "Total number of failed filer reachability checks",
                &["host", "reason"],
            )?,
            filer_up: registry.create_gauge_vec(
                "netapp_filer_up",
                "Whether the last reachability check of a filer succeeded (1=up, 0=down)",
                &["filer", "host"],
            )?,
            registered_filers: registry.create_gauge(
                "netapp_registered_filers",
                "Number of filers with active collectors",
            )?,
        })
    }

    /// Start timing a fetch
    pub fn fetch_timer(&self, filer: &str, resource: &str) -> Timer {
        Timer::new(self.fetch_duration.with_label_values(&[filer, resource]))
    }

    pub fn record_fetch_attempt(&self, filer: &str, resource: &str) {
        self.fetch_attempts.with_label_values(&[filer, resource]).inc();
    }

    pub fn record_fetch_failure(&self, filer: &str, resource: &str) {
        self.fetch_failures.with_label_values(&[filer, resource]).inc();
    }

    pub fn set_cached_records(&self, filer: &str, resource: &str, count: usize) {
        self.cached_records
            .with_label_values(&[filer, resource])
            .set(count as i64);
    }

    pub fn record_health_failure(&self, host: &str, reason: &str) {
        self.health_failures.with_label_values(&[host, reason]).inc();
    }

    pub fn set_filer_up(&self, filer: &str, host: &str, up: bool) {
        self.filer_up
            .with_label_values(&[filer, host])
            .set(i64::from(up));
    }
}
