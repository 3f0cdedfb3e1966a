use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Result, WorkQueue, validate_supplier};
use crate::store::ItemStatus;

/// Counts observed by a full-scan reset before it touched anything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullScanBefore {
    pub done: usize,
    pub failed: usize,
    pub pending: usize,
    pub processing_stale: usize,
    pub blocked: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullScanReport {
    pub supplier: String,
    pub reset_count: usize,
    pub before: FullScanBefore,
    pub pending_after: usize,
}

impl WorkQueue {
    /// Send failed items whose backoff elapsed back to pending with a fresh
    /// attempt budget. Unlike `retry_ready`, exhausted items qualify too.
    pub fn reset_failed(&self, supplier: Option<&str>) -> Result<usize> {
        if let Some(supplier) = supplier {
            validate_supplier(supplier)?;
        }

        let reset = self.with_retry("reset_failed", || {
            let now = self.now();
            self.store.write(|tx| {
                let mut reset = 0;
                for mut item in tx.scan(supplier)? {
                    let backoff_elapsed = item.next_retry_at.is_none_or(|at| at <= now);
                    if item.is_valid && item.status == ItemStatus::Failed && backoff_elapsed {
                        item.reset(now);
                        tx.put(&item)?;
                        reset += 1;
                    }
                }
                Ok(reset)
            })
        })?;

        info!(supplier = supplier.unwrap_or("*"), reset, "Reset failed items");
        self.metrics.bulk_reset();
        Ok(reset)
    }

    /// Return every valid item of a supplier to a fresh pending state so the
    /// whole catalogue is scanned again. Live leases are left alone.
    pub fn full_scan_reset(&self, supplier: &str) -> Result<FullScanReport> {
        validate_supplier(supplier)?;
        let ttl = self.policy.processing_ttl;

        let report = self.with_retry("full_scan_reset", || {
            let now = self.now();
            self.store.write(|tx| {
                let mut before = FullScanBefore::default();
                let mut reset_count = 0;
                let mut pending_after = 0;

                for mut item in tx.scan(Some(supplier))? {
                    if !item.is_valid {
                        continue;
                    }
                    let resettable = match item.status {
                        ItemStatus::Done => {
                            before.done += 1;
                            true
                        }
                        ItemStatus::Failed => {
                            before.failed += 1;
                            true
                        }
                        ItemStatus::Pending => {
                            before.pending += 1;
                            true
                        }
                        ItemStatus::Blocked => {
                            before.blocked += 1;
                            true
                        }
                        ItemStatus::Processing if item.is_stale(now, ttl) => {
                            before.processing_stale += 1;
                            true
                        }
                        ItemStatus::Processing => false,
                    };

                    if resettable {
                        item.reset(now);
                        tx.put(&item)?;
                        reset_count += 1;
                        pending_after += 1;
                    }
                }

                Ok(FullScanReport {
                    supplier: supplier.to_string(),
                    reset_count,
                    before,
                    pending_after,
                })
            })
        })?;

        warn!(
            supplier,
            reset_count = report.reset_count,
            before_done = report.before.done,
            before_failed = report.before.failed,
            before_pending = report.before.pending,
            before_blocked = report.before.blocked,
            before_processing_stale = report.before.processing_stale,
            pending_after = report.pending_after,
            "Full scan reset"
        );
        self.metrics.bulk_reset();
        Ok(report)
    }
}
