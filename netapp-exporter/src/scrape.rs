//! Scrape-synchronous fetching: no cache, one fetch per scrape

use std::sync::Arc;

use crate::fetch::ResourceFetcher;

pub struct SyncFetcher<R> {
    fetcher: Arc<dyn ResourceFetcher<R>>,
}

impl<R> SyncFetcher<R> {
    pub fn new(fetcher: Arc<dyn ResourceFetcher<R>>) -> Self {
        Self { fetcher }
    }

    /// Fetch now. Errors yield no records and never fail the scrape; they
    /// are counted by the instrumented fetcher underneath.
    pub async fn fetch_or_empty(&self) -> Vec<R> {
        self.fetcher.fetch().await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use netapp_client::ClientError;

    struct Unreachable;

    #[async_trait]
    impl ResourceFetcher<String> for Unreachable {
        async fn fetch(&self) -> Result<Vec<String>, ClientError> {
            Err(ClientError::Dns {
                host: "filer.invalid".to_string(),
                message: "not found".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_error_yields_empty() {
        let fetcher = SyncFetcher::new(Arc::new(Unreachable));
        assert!(fetcher.fetch_or_empty().await.is_empty());
    }
}
