use chrono::{DateTime, TimeDelta, Utc};
use tracing::info;

use super::{Result, WorkQueue, validate_supplier};
use crate::store::ItemStatus;

/// Retry delays indexed by attempt count (1-based), clamped at the last entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    schedule: Vec<TimeDelta>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(vec![
            TimeDelta::minutes(5),
            TimeDelta::minutes(30),
            TimeDelta::hours(2),
            TimeDelta::hours(12),
            TimeDelta::hours(48),
        ])
    }
}

impl BackoffPolicy {
    /// An empty schedule means "retry immediately"
    pub fn new(schedule: Vec<TimeDelta>) -> Self {
        Self { schedule }
    }

    pub fn delay_for(&self, attempts: u32) -> TimeDelta {
        if self.schedule.is_empty() {
            return TimeDelta::zero();
        }
        let index = (attempts.max(1) as usize - 1).min(self.schedule.len() - 1);
        // Running max keeps the curve monotone even for an unsorted schedule
        self.schedule[..=index]
            .iter()
            .copied()
            .max()
            .unwrap_or_else(TimeDelta::zero)
    }

    /// Saturates at the latest representable instant
    pub fn next_retry_at(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.delay_for(attempts))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl WorkQueue {
    /// Promote failed items whose backoff elapsed (and that still have attempts left) to pending
    pub fn retry_ready(&self, supplier: Option<&str>) -> Result<usize> {
        if let Some(supplier) = supplier {
            validate_supplier(supplier)?;
        }
        let max_attempts = self.policy.max_attempts;

        let promoted = self.with_retry("retry_ready", || {
            let now = self.now();
            self.store.write(|tx| {
                let candidates = match supplier {
                    Some(supplier) => {
                        let ids = tx.ids_with_status(supplier, ItemStatus::Failed, None, usize::MAX)?;
                        tx.load_many(&ids)?
                    }
                    None => tx.scan(None)?,
                };
                let mut promoted = 0;
                for mut item in candidates {
                    if item.is_valid && item.is_retry_ready(now, max_attempts) {
                        item.return_to_pending(now);
                        tx.put(&item)?;
                        promoted += 1;
                    }
                }
                Ok(promoted)
            })
        })?;

        if promoted > 0 {
            info!(supplier = supplier.unwrap_or("*"), promoted, "Promoted retry-ready items to pending");
        }
        self.metrics.retries_promoted(promoted);
        Ok(promoted)
    }
}
