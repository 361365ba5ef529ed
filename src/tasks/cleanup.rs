//! TTL Sweep Task
//!
//! Background task that periodically removes expired cache entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::SharedStore;

/// Spawns a background task that periodically sweeps expired cache entries.
///
/// The task runs in an infinite loop, sleeping for `interval` between sweeps.
/// It holds the store's write lock only while sweeping, so foreground reads
/// never observe a half-swept map.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_cleanup_task(manager.store(), Duration::from_secs(300));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task(store: SharedStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting TTL sweep task with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let (removed, remaining) = {
                let mut guard = store.write().await;
                let removed = guard.cleanup_expired();
                (removed, guard.len())
            };

            if removed > 0 {
                info!(
                    "TTL sweep: removed {} expired entries, {} remaining",
                    removed, remaining
                );
            } else {
                debug!("TTL sweep: no expired entries found");
            }
        }
    })
}
