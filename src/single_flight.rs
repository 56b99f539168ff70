//! Per-key de-duplication of concurrent computations.
//!
//! The first caller for a key starts the computation; callers arriving while it
//! runs await the same [`Shared`] future and receive a clone of its result, success
//! or failure. The computation runs as its own tokio task, so it finishes and
//! releases its slot even when every waiter has gone away; the next caller after
//! that starts afresh. Coordination is process-local only.

use crate::{CacheError, Result};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

type Flight<T> = Shared<BoxFuture<'static, Result<T>>>;

struct Slot<T> {
    id: u64,
    flight: Flight<T>,
}

type Slots<T> = Arc<Mutex<HashMap<String, Slot<T>>>>;

/// Runs at most one computation per key at a time.
pub struct SingleFlight<T> {
    slots: Slots<T>,
    next_id: AtomicU64,
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty guard
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `work` for `key`, or join the run already in progress for it.
    ///
    /// When joining, `work` is dropped without being polled. A panic inside the
    /// computation is reported to every waiter as a producer failure. Must be
    /// called from within a tokio runtime.
    pub async fn run_exclusive<F>(&self, key: &str, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let flight = {
            let mut slots = lock(&self.slots);
            match slots.get(key) {
                Some(slot) => {
                    debug!(key = %key, "joining in-flight computation");
                    slot.flight.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let flight = self.start(key.to_string(), id, work);
                    slots.insert(key.to_string(), Slot { id, flight: flight.clone() });
                    flight
                }
            }
        };

        flight.await
    }

    /// Whether a computation is currently running for `key`.
    pub fn is_running(&self, key: &str) -> bool {
        lock(&self.slots).contains_key(key)
    }

    /// Number of keys with a computation in progress.
    pub fn in_flight(&self) -> usize {
        lock(&self.slots).len()
    }

    fn start<F>(&self, key: String, id: u64, work: F) -> Flight<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let release = Release {
            slots: Arc::clone(&self.slots),
            key,
            id,
        };
        // Spawned under the slot lock, so the release cannot run before the slot
        // is inserted.
        let task = tokio::spawn(async move {
            let _release = release;
            work.await
        });

        async move {
            task.await.unwrap_or_else(|err| {
                if err.is_panic() {
                    Err(CacheError::producer("producer panicked"))
                } else {
                    Err(CacheError::producer("producer cancelled"))
                }
            })
        }
        .boxed()
        .shared()
    }
}

/// Frees a slot when its task ends, however it ends.
struct Release<T> {
    slots: Slots<T>,
    key: String,
    id: u64,
}

impl<T> Drop for Release<T> {
    fn drop(&mut self) {
        let mut slots = lock(&self.slots);
        // Only clear our own slot; never one started after us.
        if slots.get(&self.key).is_some_and(|slot| slot.id == self.id) {
            slots.remove(&self.key);
        }
    }
}

fn lock<T>(slots: &Slots<T>) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let guard = Arc::new(SingleFlight::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    guard
                        .run_exclusive("k", async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(42)
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(guard.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_shared_then_released() {
        let guard = Arc::new(SingleFlight::<u32>::new());
        let gate = Arc::new(Notify::new());

        let leader = {
            let guard = Arc::clone(&guard);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                guard
                    .run_exclusive("k", async move {
                        gate.notified().await;
                        Err(CacheError::producer("upstream 503"))
                    })
                    .await
            })
        };
        while !guard.is_running("k") {
            tokio::task::yield_now().await;
        }

        let follower = {
            let guard = Arc::clone(&guard);
            tokio::spawn(async move { guard.run_exclusive("k", async { Ok(7) }).await })
        };
        tokio::task::yield_now().await;
        gate.notify_one();

        let expected = Err(CacheError::producer("upstream 503"));
        assert_eq!(leader.await.unwrap(), expected);
        assert_eq!(follower.await.unwrap(), expected);

        // The slot is idle again, so a retry runs its own work.
        assert!(!guard.is_running("k"));
        assert_eq!(guard.run_exclusive("k", async { Ok(7) }).await, Ok(7));
    }

    async fn explode() -> Result<u32> {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_panicking_work_does_not_poison_the_key() {
        let guard = SingleFlight::<u32>::new();

        let result = guard.run_exclusive("k", explode()).await;
        assert_eq!(result, Err(CacheError::producer("producer panicked")));

        assert_eq!(guard.run_exclusive("k", async { Ok(1) }).await, Ok(1));
    }

    #[tokio::test]
    async fn test_abandoned_run_finishes_and_frees_the_slot() {
        let guard = SingleFlight::<&'static str>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            guard.run_exclusive("k", async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok("first")
            }),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!guard.is_running("k"));

        let counter = Arc::clone(&calls);
        let next = guard
            .run_exclusive("k", async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("second")
            })
            .await;
        assert_eq!(next, Ok("second"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let guard = SingleFlight::<&'static str>::new();

        let (a, b) = tokio::join!(
            guard.run_exclusive("a", async { Ok("a") }),
            guard.run_exclusive("b", async { Ok("b") }),
        );
        assert_eq!(a, Ok("a"));
        assert_eq!(b, Ok("b"));
    }
}
