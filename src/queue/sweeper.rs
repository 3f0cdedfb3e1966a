//! Sweeper: background task that reclaims stale leases and promotes
//! retry-ready failures.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Result, WorkQueue};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub reclaimed: usize,
    pub retried: usize,
}

impl WorkQueue {
    /// One pass of stale-lease reclamation followed by retry-ready promotion
    pub fn sweep_once(&self) -> Result<SweepReport> {
        let reclaimed = self.reclaim_stale()?;
        let retried = self.retry_ready(None)?;
        Ok(SweepReport { reclaimed, retried })
    }
}

/// Spawn the sweeper as a background tokio task.
///
/// Returns `None` when `interval` is zero. Send on (or drop) the returned
/// `watch::Sender` to stop the loop.
pub fn spawn_sweeper(
    queue: WorkQueue,
    interval: Duration,
) -> Option<(watch::Sender<()>, JoinHandle<()>)> {
    if interval.is_zero() {
        info!("Sweeper disabled");
        return None;
    }

    let (stop_tx, mut stop_rx) = watch::channel(());
    info!(interval_ms = interval.as_millis() as u64, "Starting sweeper");

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let queue = queue.clone();
                    match tokio::task::spawn_blocking(move || queue.sweep_once()).await {
                        Ok(Ok(report)) => debug!(
                            reclaimed = report.reclaimed,
                            retried = report.retried,
                            "Sweep finished"
                        ),
                        Ok(Err(e)) => warn!("Sweeper error: {}", e),
                        Err(e) => warn!("Sweeper task panicked: {}", e),
                    }
                }
                _ = stop_rx.changed() => {
                    debug!("Sweeper stopped");
                    break;
                }
            }
        }
    });

    Some((stop_tx, handle))
}
