//! Background refresh of a polling cache on a fixed period

use netapp_common::types::ResourceKind;
use netapp_common::ExporterMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::PollingCache;

/// One-shot timer; re-arming cancels the pending one
#[derive(Default)]
pub struct Watchdog {
    pending: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay` unless re-armed or disarmed first
    pub fn arm<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.disarm();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }));
    }

    pub fn disarm(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.as_ref().map_or(false, |h| !h.is_finished())
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Drives a [`PollingCache`] every `period`, first tick immediately.
/// Non-empty results replace the cache and arm a watchdog for twice the
/// period; if it fires before a newer snapshot lands the cache is cleared.
pub struct BackgroundRefresher<R> {
    cache: Arc<PollingCache<R>>,
    period: Duration,
    metrics: ExporterMetrics,
    filer: String,
    kind: ResourceKind,
}

impl<R> BackgroundRefresher<R>
where
    R: Send + Sync + 'static,
{
    pub fn new(
        cache: Arc<PollingCache<R>>,
        period: Duration,
        metrics: ExporterMetrics,
        filer: impl Into<String>,
        kind: ResourceKind,
    ) -> Self {
        Self {
            cache,
            period,
            metrics,
            filer: filer.into(),
            kind,
        }
    }

    /// Spawn the refresh loop, stopped by `cancel`
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            "{}: refreshing {} every {:?}",
            self.filer, self.kind, self.period
        );
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut watchdog = Watchdog::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.refresh(&mut watchdog).await,
            }
        }

        watchdog.disarm();
        debug!("{}: {} refresher stopped", self.filer, self.kind);
    }

    async fn refresh(&self, watchdog: &mut Watchdog) {
        let records = match self.cache.fetcher().fetch().await {
            Ok(records) => records,
            // Counted and logged by the fetcher; the watchdog keeps running
            Err(_) => return,
        };
        if records.is_empty() {
            debug!("{}: empty {} result, keeping previous snapshot", self.filer, self.kind);
            return;
        }

        let count = records.len();
        watchdog.disarm();
        let generation = self.cache.store(records).await;
        self.metrics
            .set_cached_records(&self.filer, self.kind.as_str(), count);

        let cache = Arc::clone(&self.cache);
        let metrics = self.metrics.clone();
        let filer = self.filer.clone();
        let kind = self.kind;
        watchdog.arm(self.period * 2, async move {
            // A watchdog that fired during a newer store must not clear it
            if cache.expire(generation).await {
                metrics.set_cached_records(&filer, kind.as_str(), 0);
                debug!("{}: {} snapshot expired, cache cleared", filer, kind);
            }
        });
    }
}
