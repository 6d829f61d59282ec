//! Single-Flight Module
//!
//! At most one running computation per key. Late callers for the same key
//! await the running computation instead of starting another.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{CacheError, Result};

type SharedResult<T> = Shared<BoxFuture<'static, Result<T>>>;

struct Flight<T> {
    id: u64,
    result: WeakShared<BoxFuture<'static, Result<T>>>,
}

type FlightMap<T> = Arc<Mutex<HashMap<String, Flight<T>>>>;

// == Single Flight ==
/// Deduplicates concurrent computations by key.
///
/// The map lock is held only to look up, insert or remove a flight; the
/// computation is polled by its waiters, outside any lock. The map keeps
/// only a weak handle, so a computation lives exactly as long as someone
/// awaits it: one waiter giving up leaves it running for the others, and
/// the last one giving up cancels it. Detached runs are owned by their own
/// task and always complete.
pub struct SingleFlight<T> {
    flights: FlightMap<T>,
    next_id: AtomicU64,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.flights.lock().len())
            .finish()
    }
}

/// Clears a flight from the map when its computation completes, panics or
/// is cancelled. Only removes the flight it was created for.
struct FlightGuard<T> {
    flights: FlightMap<T>,
    key: String,
    id: u64,
}

impl<T> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        let mut flights = self.flights.lock();
        if flights.get(&self.key).is_some_and(|f| f.id == self.id) {
            flights.remove(&self.key);
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    // == Execute ==
    /// Runs `factory` for `key` unless a run is already in progress, and
    /// returns that single run's result.
    ///
    /// Dropping the returned future cancels the run if no other caller is
    /// waiting on it.
    pub async fn execute<F, Fut>(&self, key: &str, factory: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (result, _) = self.join_or_start(key, factory);
        result.await
    }

    /// Starts `factory` for `key` on its own tokio task unless a run is
    /// already in progress, without waiting for it. Returns true if a new
    /// run was started.
    pub fn execute_detached<F, Fut>(&self, key: &str, factory: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (result, started) = self.join_or_start(key, factory);
        if started {
            tokio::spawn(result);
        }
        started
    }

    fn join_or_start<F, Fut>(&self, key: &str, factory: F) -> (SharedResult<T>, bool)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut flights = self.flights.lock();
        if let Some(result) = flights.get(key).and_then(|flight| flight.result.upgrade()) {
            trace!(key = %key, "joining in-flight computation");
            return (result, false);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = FlightGuard {
            flights: Arc::clone(&self.flights),
            key: key.to_string(),
            id,
        };

        debug!(key = %key, "starting computation");
        let owner = key.to_string();
        let result = async move {
            let _guard = guard;
            match AssertUnwindSafe(async move { factory().await }).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Internal(format!(
                    "computation for '{owner}' panicked"
                ))),
            }
        }
        .boxed()
        .shared();

        // A fresh `Shared` always has a strong count, so this is `Some`.
        if let Some(weak) = result.downgrade() {
            flights.insert(key.to_string(), Flight { id, result: weak });
        }
        (result, true)
    }

    // == Introspection ==
    /// Number of keys with a computation in progress.
    pub fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.flights.lock().contains_key(key)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_run() {
        let flights = Arc::new(SingleFlight::<u64>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let flights = flights.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    flights
                        .execute("k", move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok(7)
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_error_is_shared_and_cleared() {
        let flights = Arc::new(SingleFlight::<u64>::new());

        let first = {
            let flights = flights.clone();
            tokio::spawn(async move {
                flights
                    .execute("k", || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err(CacheError::Internal("boom".into()))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = flights.execute("k", || async { Ok(1) }).await;

        assert_eq!(second, Err(CacheError::Internal("boom".into())));
        assert_eq!(first.await.unwrap(), Err(CacheError::Internal("boom".into())));
        assert!(!flights.is_in_flight("k"));

        // A call after completion starts a fresh run
        assert_eq!(flights.execute("k", || async { Ok(2) }).await, Ok(2));
    }

    #[tokio::test]
    async fn test_different_keys_do_not_wait() {
        let flights = Arc::new(SingleFlight::<&'static str>::new());

        let slow = {
            let flights = flights.clone();
            tokio::spawn(async move {
                flights
                    .execute("slow", || async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok("slow")
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let fast = tokio::time::timeout(
            Duration::from_millis(500),
            flights.execute("fast", || async { Ok("fast") }),
        )
        .await;
        assert_eq!(fast.unwrap(), Ok("fast"));
        assert!(flights.is_in_flight("slow"));
        slow.abort();
    }

    #[tokio::test]
    async fn test_shared_waiter_keeps_run_alive() {
        let flights = Arc::new(SingleFlight::<u64>::new());
        let finished = Arc::new(AtomicUsize::new(0));

        let done = finished.clone();
        let mut impatient = Box::pin(flights.execute("k", move || async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            done.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }));
        let mut patient = Box::pin(flights.execute("k", || async { Ok(2) }));

        // Poll both once so the run is started and joined
        assert!(tokio::time::timeout(Duration::from_millis(5), &mut impatient)
            .await
            .is_err());
        assert!(tokio::time::timeout(Duration::from_millis(5), &mut patient)
            .await
            .is_err());
        drop(impatient);

        assert_eq!(patient.await, Ok(1));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_lone_caller_drop_cancels_run() {
        let flights = Arc::new(SingleFlight::<u64>::new());
        let finished = Arc::new(AtomicUsize::new(0));

        let done = finished.clone();
        let waiter = flights.execute("k", move || async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            done.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        // Give up on the result almost immediately
        let _ = tokio::time::timeout(Duration::from_millis(5), waiter).await;
        assert_eq!(flights.in_flight(), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        // The key is free for a fresh run
        assert_eq!(flights.execute("k", || async { Ok(2) }).await, Ok(2));
    }

    #[tokio::test]
    async fn test_detached_run_completes_without_waiters() {
        let flights = SingleFlight::<u64>::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let done = finished.clone();
        assert!(flights.execute_detached("k", move || async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            done.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }));
        assert!(flights.is_in_flight("k"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_run_is_reported_and_cleared() {
        let flights = SingleFlight::<u64>::new();

        let result = flights
            .execute("k", || async {
                let blow_up = true;
                if blow_up {
                    panic!("factory blew up");
                }
                Ok(1)
            })
            .await;

        assert!(matches!(result, Err(CacheError::Internal(_))));
        assert!(!flights.is_in_flight("k"));
    }

    #[tokio::test]
    async fn test_execute_detached_joins_existing_run() {
        let flights = SingleFlight::<u64>::new();

        assert!(flights.execute_detached("k", || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(1)
        }));
        assert!(!flights.execute_detached("k", || async { Ok(2) }));
        assert_eq!(flights.execute("k", || async { Ok(3) }).await, Ok(1));
    }
}
