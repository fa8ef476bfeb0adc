//! Polling cache of one resource kind of one filer
//!
//! The entry lock is only held to read or replace the snapshot, never while
//! the fetcher talks to the filer. Fetches go through a [`SingleFlight`], so
//! concurrent scrapes of a stale entry trigger a single request.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::fetch::ResourceFetcher;
use crate::single_flight::SingleFlight;

/// Last known snapshot of a resource kind
struct CacheEntry<R> {
    records: Arc<[R]>,
    fetched_at: Option<Instant>,
    /// Bumped on every replacement
    generation: u64,
}

impl<R> CacheEntry<R> {
    fn empty() -> Self {
        Self {
            records: Arc::from(Vec::new()),
            fetched_at: None,
            generation: 0,
        }
    }

    fn replace(&mut self, records: Vec<R>) -> u64 {
        self.records = Arc::from(records);
        self.fetched_at = Some(Instant::now());
        self.generation += 1;
        self.generation
    }

    fn is_fresh(&self, max_age: Duration) -> bool {
        !self.records.is_empty()
            && self
                .fetched_at
                .map_or(false, |fetched_at| fetched_at.elapsed() < max_age)
    }
}

pub struct PollingCache<R> {
    entry: Arc<RwLock<CacheEntry<R>>>,
    fetcher: Arc<dyn ResourceFetcher<R>>,
    flight: SingleFlight<bool>,
    name: String,
}

impl<R> PollingCache<R>
where
    R: Send + Sync + 'static,
{
    /// Create a new, empty cache around a fetcher
    pub fn new(name: impl Into<String>, fetcher: Arc<dyn ResourceFetcher<R>>) -> Self {
        Self {
            entry: Arc::new(RwLock::new(CacheEntry::empty())),
            fetcher,
            flight: SingleFlight::new(),
            name: name.into(),
        }
    }

    /// Fetcher backing this cache, for callers that drive it directly
    pub fn fetcher(&self) -> &Arc<dyn ResourceFetcher<R>> {
        &self.fetcher
    }

    /// Cached records if younger than `max_age`, otherwise fetch (or join the
    /// running fetch) first. A failed fetch leaves the previous records in place.
    pub async fn get_snapshot(&self, max_age: Duration) -> Arc<[R]> {
        {
            let entry = self.entry.read().await;
            if entry.is_fresh(max_age) {
                return Arc::clone(&entry.records);
            }
        }

        let entry = Arc::clone(&self.entry);
        let fetcher = Arc::clone(&self.fetcher);
        let outcome = self
            .flight
            .run(move || async move {
                match fetcher.fetch().await {
                    Ok(records) => {
                        entry.write().await.replace(records);
                        true
                    }
                    Err(_) => false,
                }
            })
            .await;
        if outcome != Ok(true) {
            debug!("{}: serving previous snapshot after failed refresh", self.name);
        }

        self.snapshot().await
    }

    /// Current records without triggering a fetch
    pub async fn snapshot(&self) -> Arc<[R]> {
        Arc::clone(&self.entry.read().await.records)
    }

    /// Replace the snapshot wholesale, returning its generation
    pub async fn store(&self, records: Vec<R>) -> u64 {
        self.entry.write().await.replace(records)
    }

    /// Clear only if the snapshot is still the one stored as `generation`.
    /// Returns whether the cache was cleared.
    pub async fn expire(&self, generation: u64) -> bool {
        let mut entry = self.entry.write().await;
        if entry.generation != generation {
            return false;
        }
        entry.records = Arc::from(Vec::new());
        entry.fetched_at = None;
        true
    }

    pub async fn fetched_at(&self) -> Option<Instant> {
        self.entry.read().await.fetched_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use netapp_client::ClientError;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicU32,
        fail: AtomicBool,
    }

    #[async_trait]
    impl ResourceFetcher<u32> for Counting {
        async fn fetch(&self) -> Result<Vec<u32>, ClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail.load(Ordering::SeqCst) {
                return Err(ClientError::Http { status: 500 });
            }
            Ok(vec![n])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_snapshot_served_from_cache() {
        let fetcher = Arc::new(Counting::default());
        let cache = PollingCache::new("test", fetcher.clone());

        assert_eq!(&*cache.get_snapshot(Duration::from_secs(60)).await, &[1]);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(&*cache.get_snapshot(Duration::from_secs(60)).await, &[1]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(&*cache.get_snapshot(Duration::from_secs(60)).await, &[2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_previous_records() {
        let fetcher = Arc::new(Counting::default());
        let cache = PollingCache::new("test", fetcher.clone());
        cache.get_snapshot(Duration::ZERO).await;

        fetcher.fail.store(true, Ordering::SeqCst);
        assert_eq!(&*cache.get_snapshot(Duration::ZERO).await, &[1]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_store_and_expire() {
        let cache = PollingCache::new("test", Arc::new(Counting::default()));
        let generation = cache.store(vec![4, 5]).await;
        assert_eq!(cache.snapshot().await.len(), 2);
        assert!(cache.fetched_at().await.is_some());

        assert!(cache.expire(generation).await);
        assert!(cache.snapshot().await.is_empty());
        assert!(cache.fetched_at().await.is_none());
    }

    #[tokio::test]
    async fn test_expire_ignores_superseded_generation() {
        let cache = PollingCache::new("test", Arc::new(Counting::default()));
        let first = cache.store(vec![1]).await;
        let second = cache.store(vec![2, 3]).await;
        assert_ne!(first, second);

        // A late expiry for the older snapshot leaves the newer one alone
        assert!(!cache.expire(first).await);
        assert_eq!(&*cache.snapshot().await, &[2, 3]);

        assert!(cache.expire(second).await);
        assert!(cache.snapshot().await.is_empty());
        assert!(cache.fetched_at().await.is_none());
    }
}
