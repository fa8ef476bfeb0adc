//! Fetch contract between the exporter core and the management API

use async_trait::async_trait;
use netapp_client::{ClientError, NetAppClient};
use netapp_common::types::{Aggregate, ResourceKind, SystemInfo, Volume};
use netapp_common::ExporterMetrics;
use std::sync::Arc;
use tracing::{debug, warn};

/// Operations the exporter needs from one filer
#[async_trait]
pub trait FilerApi: Send + Sync {
    /// Reachability probe, answering with the HTTP status
    async fn check_cluster(&self) -> Result<u16, ClientError>;

    async fn list_aggregates(&self) -> Result<Vec<Aggregate>, ClientError>;

    async fn list_volumes(&self) -> Result<Vec<Volume>, ClientError>;

    async fn system_version(&self) -> Result<SystemInfo, ClientError>;
}

#[async_trait]
impl FilerApi for NetAppClient {
    async fn check_cluster(&self) -> Result<u16, ClientError> {
        NetAppClient::check_cluster(self).await
    }

    async fn list_aggregates(&self) -> Result<Vec<Aggregate>, ClientError> {
        NetAppClient::list_aggregates(self).await
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>, ClientError> {
        NetAppClient::list_volumes(self).await
    }

    async fn system_version(&self) -> Result<SystemInfo, ClientError> {
        NetAppClient::system_version(self).await
    }
}

/// One resource kind of one filer
#[async_trait]
pub trait ResourceFetcher<R>: Send + Sync {
    async fn fetch(&self) -> Result<Vec<R>, ClientError>;
}

/// Fetches a resource kind through a [`FilerApi`]
#[derive(Clone)]
pub struct ApiFetcher {
    api: Arc<dyn FilerApi>,
}

impl ApiFetcher {
    pub fn new(api: Arc<dyn FilerApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ResourceFetcher<Aggregate> for ApiFetcher {
    async fn fetch(&self) -> Result<Vec<Aggregate>, ClientError> {
        self.api.list_aggregates().await
    }
}

#[async_trait]
impl ResourceFetcher<Volume> for ApiFetcher {
    async fn fetch(&self) -> Result<Vec<Volume>, ClientError> {
        self.api.list_volumes().await
    }
}

#[async_trait]
impl ResourceFetcher<SystemInfo> for ApiFetcher {
    async fn fetch(&self) -> Result<Vec<SystemInfo>, ClientError> {
        Ok(vec![self.api.system_version().await?])
    }
}

/// Wraps a fetcher with the shared attempt/failure/duration metrics.
/// Every real fetch passes through here exactly once, whoever triggered it.
pub struct InstrumentedFetcher<R> {
    inner: Arc<dyn ResourceFetcher<R>>,
    metrics: ExporterMetrics,
    filer: String,
    kind: ResourceKind,
}

impl<R> InstrumentedFetcher<R> {
    pub fn new(
        inner: Arc<dyn ResourceFetcher<R>>,
        metrics: ExporterMetrics,
        filer: impl Into<String>,
        kind: ResourceKind,
    ) -> Self {
        Self {
            inner,
            metrics,
            filer: filer.into(),
            kind,
        }
    }
}

#[async_trait]
impl<R: Send + 'static> ResourceFetcher<R> for InstrumentedFetcher<R> {
    async fn fetch(&self) -> Result<Vec<R>, ClientError> {
        let resource = self.kind.as_str();
        self.metrics.record_fetch_attempt(&self.filer, resource);
        let timer = self.metrics.fetch_timer(&self.filer, resource);
        let result = self.inner.fetch().await;
        timer.finish();

        match &result {
            Ok(records) => debug!("{}: fetched {} {} records", self.filer, records.len(), resource),
            Err(e) => {
                self.metrics.record_fetch_failure(&self.filer, resource);
                warn!("{}: fetching {} failed: {}", self.filer, resource, e);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netapp_common::MetricsRegistry;

    struct Failing;

    #[async_trait]
    impl ResourceFetcher<Volume> for Failing {
        async fn fetch(&self) -> Result<Vec<Volume>, ClientError> {
            Err(ClientError::Timeout("filer-a".to_string()))
        }
    }

    #[tokio::test]
    async fn test_instrumented_fetcher_counts_failures() {
        let registry = MetricsRegistry::new();
        let metrics = ExporterMetrics::new(&registry).unwrap();
        let fetcher = InstrumentedFetcher::new(
            Arc::new(Failing),
            metrics.clone(),
            "filer-a",
            ResourceKind::Volume,
        );

        assert!(fetcher.fetch().await.is_err());
        assert!(fetcher.fetch().await.is_err());

        let labels = ["filer-a", "volume"];
        assert_eq!(metrics.fetch_attempts.with_label_values(&labels).get(), 2);
        assert_eq!(metrics.fetch_failures.with_label_values(&labels).get(), 2);
    }
}
