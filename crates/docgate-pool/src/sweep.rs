//! Periodic sweep of expired credential failures
//!
//! Lazy expiry in `CredentialPool::next()` already makes cooled-down
//! credentials eligible. The sweep keeps `status()` and `health()` honest for
//! pools nobody has selected from in a while.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::pool::CredentialPool;

/// Spawn a task that sweeps every pool each `interval` until `cancel` fires.
pub fn spawn_sweep_task(
    pools: Vec<Arc<CredentialPool>>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick: nothing has failed yet
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("credential sweep task stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let restored = sweep_cycle(&pools).await;
                    debug!(restored, "credential sweep cycle complete");
                }
            }
        }
    })
}

/// Run one sweep over all pools. Returns the total number restored.
async fn sweep_cycle(pools: &[Arc<CredentialPool>]) -> usize {
    let mut restored = 0;
    for pool in pools {
        restored += pool.sweep_expired().await;
    }
    restored
}
