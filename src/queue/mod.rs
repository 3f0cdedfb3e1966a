//! URL work queue: lease/claim protocol over the work-item store
//!
//! Operations are synchronous and each maps onto one or more fjall write
//! transactions. Callers on an async runtime should run them through
//! `spawn_blocking`.

mod admin;
mod clock;
mod diagnostics;
mod intake;
mod lease;
mod report;
mod retry;
mod sweeper;

pub use admin::{FullScanBefore, FullScanReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use diagnostics::{ClaimDiagnostics, ItemPage, ListFilter, MAX_PER_PAGE, StatsReport, StatusCounts};
pub use intake::IngestSummary;
pub use lease::ClaimRequest;
pub use report::{ItemError, ReportOutcome, ReportSummary, UrlResult};
pub use retry::BackoffPolicy;
pub use sweeper::{SweepReport, spawn_sweeper};

use std::sync::Arc;

use chrono::TimeDelta;
use thiserror::Error;
use tracing::warn;

use crate::config::{BATCH_SIZE_CAP, QueueConfig};
use crate::observability::Metrics;
use crate::store::{StoreError, WorkStore};

pub const MAX_WORKER_ID_LEN: usize = 64;
pub const MAX_ERROR_CODE_LEN: usize = 50;
pub const MAX_ERROR_MESSAGE_LEN: usize = 2000;
pub const REPARSE_DAYS_RANGE: std::ops::RangeInclusive<u32> = 1..=30;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Work item not found: {0}")]
    NotFound(u64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueueError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        QueueError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::Store(err) if err.is_retryable())
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// Policy knobs resolved from `[queue]` configuration
#[derive(Debug, Clone)]
pub struct QueuePolicy {
    pub max_attempts: u32,
    pub processing_ttl: TimeDelta,
    pub reparse_interval: TimeDelta,
    pub backoff: BackoffPolicy,
    pub max_batch_size: usize,
    pub max_report_results: usize,
    pub max_ingest_urls: usize,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        QueuePolicy::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for QueuePolicy {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            processing_ttl: config.processing_ttl.as_chrono(),
            reparse_interval: config.reparse_interval.as_chrono(),
            backoff: BackoffPolicy::new(config.backoff.iter().map(|d| d.as_chrono()).collect()),
            max_batch_size: config.max_batch_size.min(BATCH_SIZE_CAP),
            max_report_results: config.max_report_results,
            max_ingest_urls: config.max_ingest_urls,
        }
    }
}

/// Shared handle to the queue; cheap to clone
#[derive(Clone)]
pub struct WorkQueue {
    store: Arc<WorkStore>,
    policy: Arc<QueuePolicy>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl WorkQueue {
    pub fn new(store: WorkStore, policy: QueuePolicy, metrics: Arc<Metrics>) -> Self {
        Self::with_clock(store, policy, metrics, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: WorkStore,
        policy: QueuePolicy,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store: Arc::new(store),
            policy: Arc::new(policy),
            clock,
            metrics,
        }
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    pub fn store(&self) -> &WorkStore {
        &self.store
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Run a store operation, retrying once on a transient failure
    fn with_retry<T>(&self, op: &'static str, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        match f() {
            Err(err) if err.is_retryable() => {
                warn!(op, error = %err, "Transient store error, retrying once");
                f()
            }
            other => other,
        }
    }
}

fn validate_supplier(supplier: &str) -> Result<()> {
    if supplier.trim().is_empty() {
        return Err(QueueError::validation("supplier_name", "must not be empty"));
    }
    if supplier.contains('\0') {
        return Err(QueueError::validation("supplier_name", "must not contain NUL"));
    }
    Ok(())
}

fn validate_worker_id(worker_id: &str) -> Result<()> {
    if worker_id.trim().is_empty() {
        return Err(QueueError::validation("worker_id", "must not be empty"));
    }
    if worker_id.chars().count() > MAX_WORKER_ID_LEN {
        return Err(QueueError::validation(
            "worker_id",
            format!("must be at most {} characters", MAX_WORKER_ID_LEN),
        ));
    }
    Ok(())
}

fn validate_reparse_days(reparse_days: Option<u32>) -> Result<()> {
    match reparse_days {
        Some(days) if !REPARSE_DAYS_RANGE.contains(&days) => Err(QueueError::validation(
            "reparse_days",
            format!(
                "must be between {} and {}",
                REPARSE_DAYS_RANGE.start(),
                REPARSE_DAYS_RANGE.end()
            ),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::NewWorkItem;
    use chrono::{DateTime, Utc};
    use tempfile::TempDir;

    pub struct Harness {
        pub _dir: TempDir,
        pub queue: WorkQueue,
        pub clock: Arc<ManualClock>,
    }

    impl Harness {
        pub fn clock_now(&self) -> DateTime<Utc> {
            self.clock.now()
        }
    }

    pub fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = WorkStore::open(dir.path().join("db")).unwrap();
        let clock = Arc::new(ManualClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        ));
        let queue = WorkQueue::with_clock(
            store,
            QueuePolicy::default(),
            Arc::new(Metrics::new()),
            clock.clone(),
        );
        Harness {
            _dir: dir,
            queue,
            clock,
        }
    }

    pub fn seed(queue: &WorkQueue, supplier: &str, count: usize) -> Vec<u64> {
        let now = queue.now();
        queue
            .store()
            .write(|tx| {
                (0..count)
                    .map(|n| {
                        let new = NewWorkItem::builder()
                            .url(format!("https://{}.example/p/{}", supplier, n))
                            .supplier_name(supplier)
                            .build();
                        tx.insert_new(new, now).map(|item| item.id)
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()
            })
            .map_err(QueueError::from)
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_default_config() {
        let policy = QueuePolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.processing_ttl, TimeDelta::minutes(30));
        assert_eq!(policy.reparse_interval, TimeDelta::days(7));
        assert_eq!(policy.backoff.delay_for(1), TimeDelta::minutes(5));
    }

    #[test]
    fn test_validation_helpers() {
        assert!(validate_supplier("acme").is_ok());
        assert!(validate_supplier("  ").is_err());
        assert!(validate_worker_id(&"w".repeat(64)).is_ok());
        assert!(validate_worker_id(&"w".repeat(65)).is_err());
        assert!(validate_reparse_days(None).is_ok());
        assert!(validate_reparse_days(Some(30)).is_ok());
        assert!(validate_reparse_days(Some(0)).is_err());
        assert!(validate_reparse_days(Some(31)).is_err());
    }

    #[test]
    fn test_store_io_errors_are_retryable() {
        let err = QueueError::from(StoreError::Io(std::io::Error::other("disk busy")));
        assert!(err.is_retryable());
        assert!(!QueueError::NotFound(1).is_retryable());
    }

    fn transient() -> QueueError {
        QueueError::Store(StoreError::Io(std::io::Error::other("disk busy")))
    }

    #[test]
    fn test_with_retry_recovers_after_one_transient_failure() {
        let h = test_support::harness();
        let mut calls = 0;
        let result = h.queue.with_retry("test", || {
            calls += 1;
            if calls == 1 { Err(transient()) } else { Ok(calls) }
        });
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_with_retry_gives_up_after_second_failure() {
        let h = test_support::harness();
        let mut calls = 0;
        let result: Result<()> = h.queue.with_retry("test", || {
            calls += 1;
            Err(transient())
        });
        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, QueueError::Store(StoreError::Io(_))));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_with_retry_does_not_repeat_permanent_errors() {
        let h = test_support::harness();
        let mut calls = 0;
        let result: Result<()> = h.queue.with_retry("test", || {
            calls += 1;
            Err(QueueError::NotFound(7))
        });
        assert!(matches!(result, Err(QueueError::NotFound(7))));
        assert_eq!(calls, 1);
    }
}
