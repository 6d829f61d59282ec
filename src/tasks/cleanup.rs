//! Expiry Sweep Task
//!
//! Background task that periodically drops expired cache entries. Reads
//! already treat expired entries as absent; the sweep only bounds memory.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::CacheService;

/// Spawns a background task that purges expired entries every `every`.
///
/// A sweep that overruns its period delays the next one rather than
/// triggering a burst of catch-up sweeps.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache = CacheService::new();
/// let sweep = spawn_cleanup_task(cache.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// sweep.abort();
/// ```
pub fn spawn_cleanup_task(cache: CacheService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = every.as_millis() as u64, "expiry sweep started");

        let mut ticks = interval_at(Instant::now() + every, every);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticks.tick().await;

            let removed = cache.purge_expired();
            if removed > 0 {
                info!(removed, remaining = cache.len(), "expiry sweep removed entries");
            } else {
                debug!("expiry sweep found nothing to remove");
            }
        }
    })
}
