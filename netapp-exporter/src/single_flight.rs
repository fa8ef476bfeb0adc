//! At most one in-flight operation per key; concurrent callers share its result.
//!
//! The operation runs as its own tokio task, so a caller that goes away
//! (for example a dropped scrape request) does not abort it. The slot is
//! released by the task itself once it finishes or panics.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlightError {
    #[error("in-flight operation was aborted")]
    Aborted,
}

type SharedFlight<T> = Shared<BoxFuture<'static, Result<T, FlightError>>>;

struct Flight<T> {
    id: u64,
    result: SharedFlight<T>,
}

type Slot<T> = Arc<Mutex<Option<Flight<T>>>>;

fn lock<T>(slot: &Slot<T>) -> MutexGuard<'_, Option<Flight<T>>> {
    // The guarded state is a plain Option, valid even after a panic elsewhere
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases the slot when the owning task ends, including by panic
struct ReleaseOnDrop<T> {
    slot: Slot<T>,
    id: u64,
}

impl<T> Drop for ReleaseOnDrop<T> {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if slot.as_ref().map(|flight| flight.id) == Some(self.id) {
            *slot = None;
        }
    }
}

pub struct SingleFlight<T> {
    slot: Slot<T>,
    next_id: AtomicU64,
    started: AtomicU64,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
            started: AtomicU64::new(0),
        }
    }

    /// Join the running operation, or start `make()` if none is in flight
    pub async fn run<F, Fut>(&self, make: F) -> Result<T, FlightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let result = {
            let mut slot = lock(&self.slot);
            match slot.as_ref() {
                Some(flight) => flight.result.clone(),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    self.started.fetch_add(1, Ordering::Relaxed);

                    let release = ReleaseOnDrop {
                        slot: Arc::clone(&self.slot),
                        id,
                    };
                    let operation = make();
                    let handle = tokio::spawn(async move {
                        let _release = release;
                        operation.await
                    });
                    let result = async move { handle.await.map_err(|_| FlightError::Aborted) }
                        .boxed()
                        .shared();

                    *slot = Some(Flight {
                        id,
                        result: result.clone(),
                    });
                    result
                }
            }
        };
        result.await
    }

    /// Whether an operation is currently running
    pub fn in_flight(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Number of operations started so far
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
