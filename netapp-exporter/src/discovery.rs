//! Filer discovery controller
//!
//! Every tick reloads the filer list, probes the filers that are not yet
//! registered and gives reachable ones their collectors. Registration is
//! monotonic: a registered filer keeps its collectors even if it later
//! fails probes or disappears from the configuration. Registered filers are
//! still probed each tick to drive `netapp_filer_up`.

use futures::future::join_all;
use netapp_client::{ClientConfig, NetAppClient};
use netapp_common::config::{Filer, FilerSource};
use netapp_common::types::ResourceKind;
use netapp_common::{ExporterMetrics, MetricsRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collectors::FilerCollectors;
use crate::config::CollectorSettings;
use crate::fetch::FilerApi;
use crate::health_checker::{FailureReason, FilerHealth, HealthClassifier};

/// Tick intervals: fast until the first filer registers, slow afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverySchedule {
    pub fast_interval: Duration,
    pub fast_attempts: u32,
    pub slow_interval: Duration,
}

impl DiscoverySchedule {
    /// Delay before the next tick, given completed ticks
    pub fn next_delay(&self, ticks: u32, any_registered: bool) -> Duration {
        if !any_registered && ticks < self.fast_attempts {
            self.fast_interval
        } else {
            self.slow_interval
        }
    }
}

impl Default for DiscoverySchedule {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_secs(10),
            fast_attempts: 10,
            slow_interval: Duration::from_secs(300),
        }
    }
}

/// Builds API handles for filers
pub trait FilerConnector: Send + Sync {
    fn connect(&self, filer: &Filer) -> anyhow::Result<Arc<dyn FilerApi>>;
}

/// Connects through the bundled REST client
pub struct NetAppConnector {
    timeout: Duration,
}

impl NetAppConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl FilerConnector for NetAppConnector {
    fn connect(&self, filer: &Filer) -> anyhow::Result<Arc<dyn FilerApi>> {
        let config = ClientConfig::for_filer(filer).with_timeout(self.timeout);
        Ok(Arc::new(NetAppClient::new(config)?))
    }
}

struct RegisteredFiler {
    filer: Filer,
    api: Arc<dyn FilerApi>,
    kinds: Vec<ResourceKind>,
    tasks: Vec<JoinHandle<()>>,
}

/// Result of one discovery tick
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub configured: usize,
    pub newly_registered: Vec<String>,
    pub unreachable: Vec<String>,
}

pub struct DiscoveryController {
    source: Arc<dyn FilerSource>,
    connector: Arc<dyn FilerConnector>,
    classifier: HealthClassifier,
    registry: Arc<MetricsRegistry>,
    metrics: ExporterMetrics,
    settings: CollectorSettings,
    schedule: DiscoverySchedule,
    registered: RwLock<HashMap<String, RegisteredFiler>>,
    health: RwLock<HashMap<String, FilerHealth>>,
    cancel: CancellationToken,
}

impl DiscoveryController {
    pub fn new(
        source: Arc<dyn FilerSource>,
        connector: Arc<dyn FilerConnector>,
        registry: Arc<MetricsRegistry>,
        metrics: ExporterMetrics,
        settings: CollectorSettings,
        schedule: DiscoverySchedule,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            connector,
            classifier: HealthClassifier::new(metrics.clone()),
            registry,
            metrics,
            settings,
            schedule,
            registered: RwLock::new(HashMap::new()),
            health: RwLock::new(HashMap::new()),
            cancel,
        }
    }

    /// Spawn the discovery loop
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Tick immediately, then on the schedule until cancelled
    pub async fn run(&self) {
        info!("Starting filer discovery from {}", self.source.describe());
        let mut ticks: u32 = 0;
        loop {
            self.tick().await;
            ticks = ticks.saturating_add(1);

            let delay = self
                .schedule
                .next_delay(ticks, !self.registered.read().await.is_empty());
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("Filer discovery stopped");
    }

    /// Reload the configuration, register reachable new filers and refresh
    /// the liveness of registered ones
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let configured = match self.source.load() {
            Ok(filers) => filers,
            Err(e) => {
                error!("Cannot load filers from {}: {}", self.source.describe(), e);
                Vec::new()
            }
        };
        report.configured = configured.len();

        let candidates: Vec<Filer> = {
            let registered = self.registered.read().await;
            configured
                .into_iter()
                .filter(|filer| match registered.get(&filer.name) {
                    Some(existing) => {
                        if existing.filer != *filer {
                            debug!("Filer {} changed in configuration; registered settings stay", filer.name);
                        }
                        false
                    }
                    None => true,
                })
                .collect()
        };

        let probes = candidates.into_iter().map(|filer| async move {
            let outcome = self.probe_candidate(&filer).await;
            (filer, outcome)
        });
        for (filer, outcome) in join_all(probes).await {
            match outcome {
                Some(api) => match self.register(filer.clone(), api).await {
                    Ok(()) => report.newly_registered.push(filer.name),
                    Err(e) => error!("Cannot register filer {}: {}", filer.name, e),
                },
                None => report.unreachable.push(filer.name),
            }
        }

        // Filers registered in this tick were just probed
        self.probe_registered(&report.newly_registered).await;
        self.metrics
            .registered_filers
            .set(self.registered.read().await.len() as i64);
        report
    }

    async fn probe_candidate(&self, filer: &Filer) -> Option<Arc<dyn FilerApi>> {
        self.set_health(&filer.name, FilerHealth::Checking).await;
        let api = match self.connector.connect(filer) {
            Ok(api) => api,
            Err(e) => {
                warn!("Cannot build client for filer {}: {}", filer.name, e);
                self.classifier.record_failure(&filer.host, FailureReason::Unknown);
                self.set_health(&filer.name, FilerHealth::Unhealthy(FailureReason::Unknown))
                    .await;
                self.metrics.set_filer_up(&filer.name, &filer.host, false);
                return None;
            }
        };

        let health = self.classifier.check(filer, api.as_ref()).await;
        self.set_health(&filer.name, health).await;
        self.metrics
            .set_filer_up(&filer.name, &filer.host, health.is_healthy());
        health.is_healthy().then_some(api)
    }

    async fn register(&self, filer: Filer, api: Arc<dyn FilerApi>) -> anyhow::Result<()> {
        let mut registered = self.registered.write().await;
        if registered.contains_key(&filer.name) {
            return Ok(());
        }
        let built = FilerCollectors::build(
            &filer,
            Arc::clone(&api),
            &self.settings,
            &self.metrics,
            &self.registry,
            &self.cancel,
        )
        .await?;
        info!(
            "Registered filer {} ({}) with collectors {:?}",
            filer.name, filer.host, built.kinds
        );
        registered.insert(
            filer.name.clone(),
            RegisteredFiler {
                filer,
                api,
                kinds: built.kinds,
                tasks: built.tasks,
            },
        );
        Ok(())
    }

    async fn probe_registered(&self, skip: &[String]) {
        let targets: Vec<(Filer, Arc<dyn FilerApi>)> = self
            .registered
            .read()
            .await
            .values()
            .filter(|r| !skip.contains(&r.filer.name))
            .map(|r| (r.filer.clone(), Arc::clone(&r.api)))
            .collect();

        let checks = targets.iter().map(|(filer, api)| async move {
            let health = self.classifier.check(filer, api.as_ref()).await;
            (filer, health)
        });
        for (filer, health) in join_all(checks).await {
            self.set_health(&filer.name, health).await;
            self.metrics
                .set_filer_up(&filer.name, &filer.host, health.is_healthy());
        }
    }

    async fn set_health(&self, name: &str, health: FilerHealth) {
        self.health.write().await.insert(name.to_string(), health);
    }

    pub async fn health_of(&self, name: &str) -> FilerHealth {
        self.health
            .read()
            .await
            .get(name)
            .copied()
            .unwrap_or_default()
    }

    /// Names of registered filers, sorted
    pub async fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registered.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resource kinds collected for a registered filer
    pub async fn registered_kinds(&self, name: &str) -> Option<Vec<ResourceKind>> {
        self.registered
            .read()
            .await
            .get(name)
            .map(|r| r.kinds.clone())
    }

    /// Cancel the loop and all refreshers, then wait for the refreshers
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = self
            .registered
            .write()
            .await
            .values_mut()
            .flat_map(|r| r.tasks.drain(..))
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                debug!("Refresher ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_fast_until_registered() {
        let schedule = DiscoverySchedule::default();
        assert_eq!(schedule.next_delay(1, false), Duration::from_secs(10));
        assert_eq!(schedule.next_delay(9, false), Duration::from_secs(10));
        assert_eq!(schedule.next_delay(10, false), Duration::from_secs(300));
        assert_eq!(schedule.next_delay(1, true), Duration::from_secs(300));
    }
}
