//! Per-filer scrape collectors
//!
//! Each collector owns its metric descriptor table and a [`ResourceReader`]
//! that decides, per caching policy, where the records come from.

pub mod aggregate;
pub mod system;
pub mod volume;

use async_trait::async_trait;
use netapp_common::config::Filer;
use netapp_common::metrics::scrape_gauge_vec;
use netapp_common::types::{Aggregate, ResourceKind, SystemInfo, Volume};
use netapp_common::{ExporterMetrics, MetricsRegistry, ScrapeCollector};
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::PollingCache;
use crate::config::{CachePolicy, CollectorSettings};
use crate::fetch::{ApiFetcher, FilerApi, InstrumentedFetcher, ResourceFetcher};
use crate::scheduler::BackgroundRefresher;
use crate::scrape::SyncFetcher;

/// Where a collector reads its records from on scrape
pub enum ResourceReader<R> {
    Synchronous(SyncFetcher<R>),
    OnDemand {
        cache: Arc<PollingCache<R>>,
        max_age: Duration,
    },
    Background {
        cache: Arc<PollingCache<R>>,
    },
}

impl<R> ResourceReader<R>
where
    R: Send + Sync + 'static,
{
    pub async fn read(&self) -> Arc<[R]> {
        match self {
            ResourceReader::Synchronous(fetcher) => Arc::from(fetcher.fetch_or_empty().await),
            ResourceReader::OnDemand { cache, max_age } => cache.get_snapshot(*max_age).await,
            ResourceReader::Background { cache } => cache.snapshot().await,
        }
    }
}

/// One gauge derived from every record
pub struct RecordMetric<R> {
    pub name: &'static str,
    pub help: &'static str,
    pub value: fn(&R) -> f64,
}

/// Record filter; skipped records are not failures
pub type RecordFilter<R> = Box<dyn Fn(&R) -> bool + Send + Sync>;

pub struct RecordCollector<R> {
    name: String,
    reader: ResourceReader<R>,
    table: Vec<RecordMetric<R>>,
    label_names: &'static [&'static str],
    label_values: fn(&R) -> Vec<String>,
    const_labels: HashMap<String, String>,
    filter: Option<RecordFilter<R>>,
}

impl<R> RecordCollector<R> {
    pub fn new(
        filer: &Filer,
        kind: ResourceKind,
        reader: ResourceReader<R>,
        table: Vec<RecordMetric<R>>,
        label_names: &'static [&'static str],
        label_values: fn(&R) -> Vec<String>,
    ) -> Self {
        Self {
            name: format!("{}/{}", filer.name, kind),
            reader,
            table,
            label_names,
            label_values,
            const_labels: filer_labels(filer),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: RecordFilter<R>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Render records into metric families, one per table entry
    pub fn render(&self, records: &[R]) -> Vec<MetricFamily> {
        let mut families = Vec::with_capacity(self.table.len());
        let kept: Vec<&R> = records
            .iter()
            .filter(|record| self.filter.as_ref().map_or(true, |keep| keep(*record)))
            .collect();

        for metric in &self.table {
            let gauge = match scrape_gauge_vec(
                metric.name,
                metric.help,
                &self.const_labels,
                self.label_names,
            ) {
                Ok(gauge) => gauge,
                Err(e) => {
                    warn!("{}: cannot build {}: {}", self.name, metric.name, e);
                    continue;
                }
            };
            for &record in &kept {
                let values = (self.label_values)(record);
                let values: Vec<&str> = values.iter().map(String::as_str).collect();
                match gauge.get_metric_with_label_values(&values) {
                    Ok(sample) => sample.set((metric.value)(record)),
                    Err(e) => warn!("{}: skipping {} sample: {}", self.name, metric.name, e),
                }
            }
            families.extend(gauge.collect());
        }
        families
    }
}

#[async_trait]
impl<R> ScrapeCollector for RecordCollector<R>
where
    R: Send + Sync + 'static,
{
    async fn collect(&self) -> Vec<MetricFamily> {
        let records = self.reader.read().await;
        debug!("{}: rendering {} records", self.name, records.len());
        self.render(&records)
    }
}

/// Constant labels identifying the filer on every record metric
pub fn filer_labels(filer: &Filer) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    labels.insert("filer".to_string(), filer.name.clone());
    labels.insert(
        "availability_zone".to_string(),
        filer.availability_zone.clone(),
    );
    labels
}

pub(crate) fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Collectors and background tasks created for one registered filer
pub struct FilerCollectors {
    pub kinds: Vec<ResourceKind>,
    pub tasks: Vec<JoinHandle<()>>,
}

impl FilerCollectors {
    /// Build one collector per enabled kind and register it with `registry`.
    /// Background policies spawn a refresher stopped by `cancel`.
    pub async fn build(
        filer: &Filer,
        api: Arc<dyn FilerApi>,
        settings: &CollectorSettings,
        metrics: &ExporterMetrics,
        registry: &MetricsRegistry,
        cancel: &CancellationToken,
    ) -> netapp_common::Result<Self> {
        let mut built = Self {
            kinds: Vec::new(),
            tasks: Vec::new(),
        };
        let api = ApiFetcher::new(api);

        for kind in settings.enabled.kinds() {
            let policy = settings.policies.policy(kind);
            let collector: Arc<dyn ScrapeCollector> = match kind {
                ResourceKind::Aggregate => {
                    let reader = built.reader::<Aggregate>(filer, kind, policy, &api, metrics, cancel);
                    Arc::new(aggregate::collector(filer, reader))
                }
                ResourceKind::Volume => {
                    let reader = built.reader::<Volume>(filer, kind, policy, &api, metrics, cancel);
                    Arc::new(volume::collector(filer, reader))
                }
                ResourceKind::System => {
                    let reader = built.reader::<SystemInfo>(filer, kind, policy, &api, metrics, cancel);
                    Arc::new(system::collector(filer, reader))
                }
            };
            registry
                .register_collector(format!("{}/{}", filer.name, kind), collector)
                .await?;
            built.kinds.push(kind);
        }
        Ok(built)
    }

    fn reader<R>(
        &mut self,
        filer: &Filer,
        kind: ResourceKind,
        policy: CachePolicy,
        api: &ApiFetcher,
        metrics: &ExporterMetrics,
        cancel: &CancellationToken,
    ) -> ResourceReader<R>
    where
        R: Send + Sync + 'static,
        ApiFetcher: ResourceFetcher<R>,
    {
        let fetcher: Arc<dyn ResourceFetcher<R>> = Arc::new(InstrumentedFetcher::new(
            Arc::new(api.clone()),
            metrics.clone(),
            filer.name.clone(),
            kind,
        ));
        let cache_name = format!("{}/{}", filer.name, kind);

        match policy {
            CachePolicy::Synchronous => ResourceReader::Synchronous(SyncFetcher::new(fetcher)),
            CachePolicy::OnDemand { max_age } => ResourceReader::OnDemand {
                cache: Arc::new(PollingCache::new(cache_name, fetcher)),
                max_age,
            },
            CachePolicy::Background { period } => {
                let cache = Arc::new(PollingCache::new(cache_name, fetcher));
                let refresher = BackgroundRefresher::new(
                    Arc::clone(&cache),
                    period,
                    metrics.clone(),
                    filer.name.clone(),
                    kind,
                );
                self.tasks.push(refresher.spawn(cancel.child_token()));
                ResourceReader::Background { cache }
            }
        }
    }
}
