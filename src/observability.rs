//! In-process queue metrics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording queue counters
#[derive(Debug, Default)]
pub struct Metrics {
    claims: AtomicU64,
    items_claimed: AtomicU64,
    empty_claims: AtomicU64,
    reported_done: AtomicU64,
    reported_failed: AtomicU64,
    reported_blocked: AtomicU64,
    report_errors: AtomicU64,
    leases_reclaimed: AtomicU64,
    leases_released: AtomicU64,
    leases_renewed: AtomicU64,
    retries_promoted: AtomicU64,
    items_ingested: AtomicU64,
    bulk_resets: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, items: usize) {
        self.claims.fetch_add(1, Ordering::Relaxed);
        if items == 0 {
            self.empty_claims.fetch_add(1, Ordering::Relaxed);
        } else {
            self.items_claimed.fetch_add(items as u64, Ordering::Relaxed);
        }
        tracing::debug!(counter = "claims", items, "Metric incremented");
    }

    pub fn reported(&self, done: usize, failed: usize, blocked: usize, errors: usize) {
        self.reported_done.fetch_add(done as u64, Ordering::Relaxed);
        self.reported_failed.fetch_add(failed as u64, Ordering::Relaxed);
        self.reported_blocked.fetch_add(blocked as u64, Ordering::Relaxed);
        self.report_errors.fetch_add(errors as u64, Ordering::Relaxed);
        tracing::debug!(counter = "reported", done, failed, blocked, errors, "Metric incremented");
    }

    pub fn leases_reclaimed(&self, count: usize) {
        self.leases_reclaimed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn leases_released(&self, count: usize) {
        self.leases_released.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn leases_renewed(&self, count: usize) {
        self.leases_renewed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn retries_promoted(&self, count: usize) {
        self.retries_promoted.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn items_ingested(&self, count: usize) {
        self.items_ingested.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bulk_reset(&self) {
        self.bulk_resets.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "bulk_resets", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            claims: self.claims.load(Ordering::Relaxed),
            items_claimed: self.items_claimed.load(Ordering::Relaxed),
            empty_claims: self.empty_claims.load(Ordering::Relaxed),
            reported_done: self.reported_done.load(Ordering::Relaxed),
            reported_failed: self.reported_failed.load(Ordering::Relaxed),
            reported_blocked: self.reported_blocked.load(Ordering::Relaxed),
            report_errors: self.report_errors.load(Ordering::Relaxed),
            leases_reclaimed: self.leases_reclaimed.load(Ordering::Relaxed),
            leases_released: self.leases_released.load(Ordering::Relaxed),
            leases_renewed: self.leases_renewed.load(Ordering::Relaxed),
            retries_promoted: self.retries_promoted.load(Ordering::Relaxed),
            items_ingested: self.items_ingested.load(Ordering::Relaxed),
            bulk_resets: self.bulk_resets.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub claims: u64,
    pub items_claimed: u64,
    pub empty_claims: u64,
    pub reported_done: u64,
    pub reported_failed: u64,
    pub reported_blocked: u64,
    pub report_errors: u64,
    pub leases_reclaimed: u64,
    pub leases_released: u64,
    pub leases_renewed: u64,
    pub retries_promoted: u64,
    pub items_ingested: u64,
    pub bulk_resets: u64,
}
