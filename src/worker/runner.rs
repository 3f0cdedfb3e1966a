use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use super::client::QueueClient;
use super::processor::PageProcessor;
use super::{WorkerError, WorkerSettings};
use crate::api::models::{ClaimRequest, ClaimedUrl};
use crate::queue::{ReportOutcome, UrlResult};

/// Totals for one worker run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub batches: u32,
    pub claimed: usize,
    pub done: usize,
    pub failed: usize,
    pub blocked: usize,
    pub report_errors: usize,
    pub released: usize,
}

pub struct WorkerRunner {
    client: Arc<QueueClient>,
    processor: Arc<dyn PageProcessor>,
    settings: WorkerSettings,
}

impl WorkerRunner {
    pub fn new(
        client: QueueClient,
        processor: Arc<dyn PageProcessor>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            client: Arc::new(client),
            processor,
            settings,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.settings.worker_id
    }

    /// Run until the queue stays empty, `max_batches` is hit, a request to
    /// the queue fails or `shutdown` flips to true.
    ///
    /// Leases still held are released on every exit path.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<WorkerSummary, WorkerError> {
        info!(
            worker_id = %self.settings.worker_id,
            supplier = %self.settings.supplier_name,
            batch_size = self.settings.batch_size,
            concurrency = self.settings.concurrency,
            "Worker starting"
        );

        let mut summary = WorkerSummary::default();
        let outcome = self.run_batches(&mut summary, &mut shutdown).await;

        match self
            .client
            .release(&self.settings.worker_id, Some(&self.settings.supplier_name))
            .await
        {
            Ok(released) => summary.released = released,
            Err(e) => warn!(worker_id = %self.settings.worker_id, "Failed to release leases: {}", e),
        }

        info!(
            worker_id = %self.settings.worker_id,
            batches = summary.batches,
            claimed = summary.claimed,
            done = summary.done,
            failed = summary.failed,
            blocked = summary.blocked,
            released = summary.released,
            "Worker stopped"
        );

        outcome.map(|_| summary)
    }

    async fn run_batches(
        &self,
        summary: &mut WorkerSummary,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), WorkerError> {
        let request = ClaimRequest {
            supplier_name: self.settings.supplier_name.clone(),
            material_type: self.settings.material_type.clone(),
            batch_size: self.settings.batch_size,
            worker_id: self.settings.worker_id.clone(),
            reparse_days: self.settings.reparse_days,
        };
        let mut empty_streak = 0u32;

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, stopping worker");
                return Ok(());
            }
            if let Some(max) = self.settings.max_batches {
                if summary.batches >= max {
                    info!(max_batches = max, "Batch limit reached");
                    return Ok(());
                }
            }

            let claimed = self.client.claim(&request).await?;

            if claimed.is_empty() {
                empty_streak += 1;
                if empty_streak >= self.settings.max_empty_batches {
                    info!(empty_streak, "Queue drained, stopping worker");
                    return Ok(());
                }
                debug!(empty_streak, "Empty claim, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.empty_backoff) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }

            empty_streak = 0;
            summary.batches += 1;
            summary.claimed += claimed.len();

            let item_ids: Vec<u64> = claimed.iter().map(|item| item.item_id).collect();
            let heartbeat = spawn_renewal(
                self.client.clone(),
                self.settings.worker_id.clone(),
                item_ids,
                self.settings.renew_interval,
            );

            let results = self.process_batch(claimed).await;
            drop(heartbeat);

            let response = self.client.report(&results).await?;
            summary.done += response.processed.done;
            summary.failed += response.processed.failed;
            summary.blocked += response.processed.blocked;
            summary.report_errors += response.processed.errors;

            for error in &response.item_errors {
                warn!(item_id = error.item_id, "Report rejected: {}", error.message);
            }
        }
    }

    /// Process a batch with at most `concurrency` pages in flight
    async fn process_batch(&self, claimed: Vec<ClaimedUrl>) -> Vec<UrlResult> {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));
        let mut pending: HashSet<u64> = claimed.iter().map(|item| item.item_id).collect();
        let mut tasks = JoinSet::new();

        for item in claimed {
            let semaphore = semaphore.clone();
            let processor = self.processor.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                processor.process(&item).await
            });
        }

        let mut results = Vec::with_capacity(pending.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    pending.remove(&result.item_id);
                    results.push(result);
                }
                Err(e) => warn!("Processor task aborted: {}", e),
            }
        }

        // Items whose task panicked still need an outcome
        for item_id in pending {
            results.push(
                UrlResult::new(item_id, ReportOutcome::Failed)
                    .with_error("UNKNOWN", "processor task aborted"),
            );
        }

        results
    }
}

/// Renew the batch's leases every `period` until the returned sender is dropped
fn spawn_renewal(
    client: Arc<QueueClient>,
    worker_id: String,
    item_ids: Vec<u64>,
    period: Duration,
) -> watch::Sender<()> {
    let (stop_tx, mut stop_rx) = watch::channel(());

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match client.renew(&worker_id, Some(item_ids.clone())).await {
                        Ok(renewed) => debug!(%worker_id, renewed, "Leases renewed"),
                        Err(e) => warn!(%worker_id, "Lease renewal failed: {}", e),
                    }
                }
                _ = stop_rx.changed() => {
                    debug!(%worker_id, "Lease renewal stopped");
                    break;
                }
            }
        }
    });

    stop_tx
}
