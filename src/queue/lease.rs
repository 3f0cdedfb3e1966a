use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use super::{
    QueueError, Result, WorkQueue, validate_reparse_days, validate_supplier, validate_worker_id,
};
use crate::store::{self, ItemStatus, RawTx, StoreTx, WorkItem, window_start};

/// Pending ids read from the status index per round trip while filling a batch
const PENDING_PAGE: usize = 256;

/// Parameters of one claim call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub supplier_name: String,
    pub material_type: Option<String>,
    pub batch_size: usize,
    pub worker_id: String,
    /// Overrides the configured reparse interval for `done` items
    pub reparse_days: Option<u32>,
}

impl ClaimRequest {
    pub fn new(supplier_name: impl Into<String>, batch_size: usize, worker_id: impl Into<String>) -> Self {
        Self {
            supplier_name: supplier_name.into(),
            material_type: None,
            batch_size,
            worker_id: worker_id.into(),
            reparse_days: None,
        }
    }

    pub fn material_type(mut self, material_type: impl Into<String>) -> Self {
        self.material_type = Some(material_type.into());
        self
    }

    pub fn reparse_days(mut self, days: u32) -> Self {
        self.reparse_days = Some(days);
        self
    }
}

impl WorkQueue {
    pub(super) fn reparse_window(&self, reparse_days: Option<u32>) -> TimeDelta {
        reparse_days
            .map(|days| TimeDelta::days(i64::from(days)))
            .unwrap_or(self.policy.reparse_interval)
    }

    fn validate_claim(&self, request: &ClaimRequest) -> Result<()> {
        validate_supplier(&request.supplier_name)?;
        validate_worker_id(&request.worker_id)?;
        validate_reparse_days(request.reparse_days)?;
        if request.batch_size == 0 || request.batch_size > self.policy.max_batch_size {
            return Err(QueueError::validation(
                "batch_size",
                format!("must be between 1 and {}", self.policy.max_batch_size),
            ));
        }
        Ok(())
    }

    /// Lease up to `batch_size` claimable items to `worker_id`.
    ///
    /// Stale leases are reclaimed first. Selection and locking then happen in a
    /// single write transaction, so concurrent callers never share an item.
    /// Candidates come from the supplier's pending ids and its reparse-due done
    /// ids, merged in creation order; other rows are never read.
    pub fn claim(&self, request: &ClaimRequest) -> Result<Vec<WorkItem>> {
        self.validate_claim(request)?;

        self.reclaim_stale()?;

        let window = self.reparse_window(request.reparse_days);
        let ttl = self.policy.processing_ttl;
        let supplier = request.supplier_name.as_str();
        let material = request.material_type.as_deref();

        let claimed = self.with_retry("claim", || {
            let now = self.now();
            self.store.write(|tx| {
                let mut claimed = Vec::with_capacity(request.batch_size);
                let mut candidates = ClaimCandidates::new(tx, supplier, now, window)?;
                while claimed.len() < request.batch_size {
                    let Some(id) = candidates.next(tx)? else {
                        break;
                    };
                    let Some(mut item) = tx.get(id)? else {
                        continue;
                    };
                    if !item.matches_material(material) || !item.is_claimable(now, window, ttl) {
                        continue;
                    }
                    item.lease(&request.worker_id, now);
                    tx.put(&item)?;
                    claimed.push(item);
                }
                Ok(claimed)
            })
        })?;

        self.metrics.claim(claimed.len());

        if claimed.is_empty() {
            match self.claim_diagnostics(supplier, material, request.reparse_days) {
                Ok(diagnostics) => info!(
                    supplier,
                    worker_id = %request.worker_id,
                    material_type = material.unwrap_or("*"),
                    ?diagnostics,
                    "Claim returned no items"
                ),
                Err(err) => warn!(supplier, error = %err, "Claim returned no items; diagnostics unavailable"),
            }
        } else {
            debug!(
                supplier,
                worker_id = %request.worker_id,
                count = claimed.len(),
                "Leased items"
            );
        }

        Ok(claimed)
    }

    /// Revert every `processing` item whose lease outlived the TTL to `pending`
    pub fn reclaim_stale(&self) -> Result<usize> {
        let ttl = self.policy.processing_ttl;

        let reclaimed = self.with_retry("reclaim_stale", || {
            let now = self.now();
            self.store.write(|tx| {
                let Some(cutoff) = window_start(now, ttl) else {
                    return Ok(0);
                };
                let ids = tx.leased_ids(Some(cutoff))?;
                let mut reclaimed = 0;
                for mut item in tx.load_many(&ids)? {
                    if item.is_stale(now, ttl) {
                        debug!(
                            item_id = item.id,
                            locked_by = item.locked_by.as_deref().unwrap_or(""),
                            "Reclaiming stale lease"
                        );
                        item.return_to_pending(now);
                        tx.put(&item)?;
                        reclaimed += 1;
                    }
                }
                Ok(reclaimed)
            })
        })?;

        if reclaimed > 0 {
            warn!(reclaimed, "Reclaimed stale leases");
        }
        self.metrics.leases_reclaimed(reclaimed);
        Ok(reclaimed)
    }

    /// Give back every lease held by `worker_id`; attempts stay unchanged
    pub fn release(&self, worker_id: &str, supplier: Option<&str>) -> Result<usize> {
        validate_worker_id(worker_id)?;
        if let Some(supplier) = supplier {
            validate_supplier(supplier)?;
        }

        let released = self.with_retry("release", || {
            let now = self.now();
            self.store.write(|tx| {
                let ids = match supplier {
                    Some(supplier) => {
                        tx.ids_with_status(supplier, ItemStatus::Processing, None, usize::MAX)?
                    }
                    None => tx.leased_ids(None)?,
                };
                let mut released = 0;
                for mut item in tx.load_many(&ids)? {
                    if item.is_held_by(worker_id) {
                        item.return_to_pending(now);
                        tx.put(&item)?;
                        released += 1;
                    }
                }
                Ok(released)
            })
        })?;

        if released > 0 {
            warn!(
                worker_id,
                supplier = supplier.unwrap_or("*"),
                released,
                "Worker released leases without reporting"
            );
        }
        self.metrics.leases_released(released);
        Ok(released)
    }

    /// Extend leases the worker still holds; items it lost are skipped
    pub fn renew(&self, worker_id: &str, item_ids: Option<&[u64]>) -> Result<usize> {
        validate_worker_id(worker_id)?;

        let renewed = self.with_retry("renew", || {
            let now = self.now();
            self.store.write(|tx| {
                let held: Vec<WorkItem> = match item_ids {
                    Some(ids) => {
                        let mut held = Vec::with_capacity(ids.len());
                        for id in ids {
                            if let Some(item) = tx.get(*id)? {
                                held.push(item);
                            }
                        }
                        held
                    }
                    None => {
                        let ids = tx.leased_ids(None)?;
                        tx.load_many(&ids)?
                    }
                };

                let mut renewed = 0;
                for mut item in held {
                    if item.is_held_by(worker_id) {
                        item.renew(now);
                        tx.put(&item)?;
                        renewed += 1;
                    }
                }
                Ok(renewed)
            })
        })?;

        debug!(worker_id, renewed, "Renewed leases");
        self.metrics.leases_renewed(renewed);
        Ok(renewed)
    }
}

/// Claim candidates of one supplier in ascending id order: pending ids paged
/// from the status index merged with the (usually short) reparse-due list
struct ClaimCandidates {
    supplier: String,
    pending: VecDeque<u64>,
    pending_after: Option<u64>,
    pending_exhausted: bool,
    due: std::vec::IntoIter<u64>,
    next_due: Option<u64>,
}

impl ClaimCandidates {
    fn new<T: RawTx>(
        tx: &mut StoreTx<'_, T>,
        supplier: &str,
        now: DateTime<Utc>,
        window: TimeDelta,
    ) -> store::Result<Self> {
        let mut due = match window_start(now, window) {
            Some(cutoff) => tx.reparse_candidates(supplier, cutoff)?,
            None => Vec::new(),
        };
        due.sort_unstable();
        let mut due = due.into_iter();
        let next_due = due.next();

        Ok(Self {
            supplier: supplier.to_string(),
            pending: Default::default(),
            pending_after: None,
            pending_exhausted: false,
            due,
            next_due,
        })
    }

    fn next<T: RawTx>(&mut self, tx: &mut StoreTx<'_, T>) -> store::Result<Option<u64>> {
        if self.pending.is_empty() && !self.pending_exhausted {
            let page = tx.ids_with_status(
                &self.supplier,
                ItemStatus::Pending,
                self.pending_after,
                PENDING_PAGE,
            )?;
            self.pending_exhausted = page.len() < PENDING_PAGE;
            self.pending_after = page.last().copied().or(self.pending_after);
            self.pending.extend(page);
        }

        let take_due = match (self.pending.front(), self.next_due) {
            (Some(&pending), Some(due)) => due < pending,
            (None, Some(_)) => true,
            (_, None) => false,
        };
        if take_due {
            let id = self.next_due;
            self.next_due = self.due.next();
            Ok(id)
        } else {
            Ok(self.pending.pop_front())
        }
    }
}
