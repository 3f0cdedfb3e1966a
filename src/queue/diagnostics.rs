use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{QueueError, Result, WorkQueue, validate_reparse_days, validate_supplier};
use crate::store::{ItemStatus, WorkItem};

pub const MAX_PER_PAGE: usize = 100;
const DEFAULT_PER_PAGE: usize = 50;

/// Item counts by status plus validity totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
    pub failed: usize,
    pub blocked: usize,
    pub valid: usize,
    pub invalid: usize,
}

impl StatusCounts {
    fn add(&mut self, item: &WorkItem) {
        self.total += 1;
        match item.status {
            ItemStatus::Pending => self.pending += 1,
            ItemStatus::Processing => self.processing += 1,
            ItemStatus::Done => self.done += 1,
            ItemStatus::Failed => self.failed += 1,
            ItemStatus::Blocked => self.blocked += 1,
        }
        if item.is_valid {
            self.valid += 1;
        } else {
            self.invalid += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub totals: StatusCounts,
    pub by_supplier: BTreeMap<String, StatusCounts>,
}

/// Why a claim for a supplier may come back empty
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimDiagnostics {
    pub pending_count: usize,
    pub failed_ready_count: usize,
    pub failed_not_ready_count: usize,
    pub failed_exhausted_count: usize,
    pub processing_locked_count: usize,
    pub processing_stale_count: usize,
    pub done_count: usize,
    pub done_reparse_due_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ListFilter {
    pub supplier_name: Option<String>,
    pub status: Option<ItemStatus>,
    pub material_type: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemPage {
    pub items: Vec<WorkItem>,
    pub current_page: usize,
    pub last_page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl WorkQueue {
    pub fn stats(&self, supplier: Option<&str>) -> Result<StatsReport> {
        if let Some(supplier) = supplier {
            validate_supplier(supplier)?;
        }

        let items = self.store.read(|tx| tx.scan(supplier))?;

        let mut report = StatsReport::default();
        for item in &items {
            report.totals.add(item);
            report
                .by_supplier
                .entry(item.supplier_name.clone())
                .or_default()
                .add(item);
        }
        Ok(report)
    }

    /// Read-only breakdown of valid items for one supplier
    pub fn claim_diagnostics(
        &self,
        supplier: &str,
        material_type: Option<&str>,
        reparse_days: Option<u32>,
    ) -> Result<ClaimDiagnostics> {
        validate_supplier(supplier)?;
        validate_reparse_days(reparse_days)?;

        let now = self.now();
        let ttl = self.policy.processing_ttl;
        let window = self.reparse_window(reparse_days);
        let max_attempts = self.policy.max_attempts;

        let items = self.store.read(|tx| tx.scan(Some(supplier)))?;

        let mut diagnostics = ClaimDiagnostics::default();
        for item in items
            .iter()
            .filter(|item| item.is_valid && item.matches_material(material_type))
        {
            match item.status {
                ItemStatus::Pending => diagnostics.pending_count += 1,
                ItemStatus::Failed if item.is_exhausted(max_attempts) => {
                    diagnostics.failed_exhausted_count += 1
                }
                ItemStatus::Failed if item.is_retry_ready(now, max_attempts) => {
                    diagnostics.failed_ready_count += 1
                }
                ItemStatus::Failed => diagnostics.failed_not_ready_count += 1,
                ItemStatus::Processing if item.is_stale(now, ttl) => {
                    diagnostics.processing_stale_count += 1
                }
                ItemStatus::Processing => diagnostics.processing_locked_count += 1,
                ItemStatus::Done => {
                    diagnostics.done_count += 1;
                    if item.reparse_due(now, window) {
                        diagnostics.done_reparse_due_count += 1;
                    }
                }
                ItemStatus::Blocked => {}
            }
        }
        Ok(diagnostics)
    }

    /// Filtered, paginated listing: active work first, then most recently attempted
    pub fn list(&self, filter: &ListFilter) -> Result<ItemPage> {
        let per_page = filter.per_page.unwrap_or(DEFAULT_PER_PAGE);
        if per_page == 0 || per_page > MAX_PER_PAGE {
            return Err(QueueError::validation(
                "per_page",
                format!("must be between 1 and {}", MAX_PER_PAGE),
            ));
        }
        let page = filter.page.unwrap_or(1).max(1);
        let supplier = filter.supplier_name.as_deref();
        if let Some(supplier) = supplier {
            validate_supplier(supplier)?;
        }

        let mut items: Vec<WorkItem> = self
            .store
            .read(|tx| tx.scan(supplier))?
            .into_iter()
            .filter(|item| filter.status.is_none_or(|status| item.status == status))
            .filter(|item| item.matches_material(filter.material_type.as_deref()))
            .collect();

        items.sort_by(|a, b| {
            a.status
                .list_rank()
                .cmp(&b.status.list_rank())
                .then_with(|| b.last_attempt_at.cmp(&a.last_attempt_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = items.len();
        let last_page = total.div_ceil(per_page).max(1);
        let items = items
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        Ok(ItemPage {
            items,
            current_page: page,
            last_page,
            per_page,
            total,
        })
    }

    pub fn get(&self, item_id: u64) -> Result<WorkItem> {
        self.store
            .get(item_id)?
            .ok_or(QueueError::NotFound(item_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::test_support::{harness, seed};
    use crate::queue::{ClaimRequest, ReportOutcome, UrlResult};
    use chrono::TimeDelta;

    #[test]
    fn test_stats_by_supplier() {
        let h = harness();
        seed(&h.queue, "acme", 3);
        seed(&h.queue, "globex", 2);
        h.queue.claim(&ClaimRequest::new("acme", 1, "w1")).unwrap();

        let all = h.queue.stats(None).unwrap();
        assert_eq!(all.totals.total, 5);
        assert_eq!(all.totals.pending, 4);
        assert_eq!(all.totals.processing, 1);
        assert_eq!(all.totals.valid, 5);
        assert_eq!(all.by_supplier["acme"].processing, 1);
        assert_eq!(all.by_supplier["globex"].pending, 2);

        let acme = h.queue.stats(Some("acme")).unwrap();
        assert_eq!(acme.totals.total, 3);
        assert_eq!(acme.by_supplier.len(), 1);
    }

    #[test]
    fn test_claim_diagnostics_buckets() {
        let h = harness();
        let ids = seed(&h.queue, "acme", 5);

        h.queue.claim(&ClaimRequest::new("acme", 4, "w1")).unwrap();
        h.queue
            .report(&[
                UrlResult::new(ids[0], ReportOutcome::Done),
                UrlResult::new(ids[1], ReportOutcome::Failed),
                UrlResult::new(ids[2], ReportOutcome::Blocked),
            ])
            .unwrap();

        let diagnostics = h.queue.claim_diagnostics("acme", None, None).unwrap();
        assert_eq!(diagnostics.pending_count, 1);
        assert_eq!(diagnostics.failed_not_ready_count, 1);
        assert_eq!(diagnostics.processing_locked_count, 1);
        assert_eq!(diagnostics.done_count, 1);
        assert_eq!(diagnostics.done_reparse_due_count, 0);

        h.clock.advance(TimeDelta::minutes(31));
        let later = h.queue.claim_diagnostics("acme", None, Some(1)).unwrap();
        assert_eq!(later.failed_ready_count, 1);
        assert_eq!(later.processing_stale_count, 1);
        assert_eq!(later.processing_locked_count, 0);

        h.clock.advance(TimeDelta::days(2));
        let reparse = h.queue.claim_diagnostics("acme", None, Some(1)).unwrap();
        assert_eq!(reparse.done_reparse_due_count, 1);
    }

    #[test]
    fn test_list_order_and_pagination() {
        let h = harness();
        let ids = seed(&h.queue, "acme", 4);

        h.queue.claim(&ClaimRequest::new("acme", 2, "w1")).unwrap();
        h.queue
            .report(&[UrlResult::new(ids[0], ReportOutcome::Done)])
            .unwrap();

        let page = h
            .queue
            .list(&ListFilter {
                supplier_name: Some("acme".into()),
                per_page: Some(3),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(page.total, 4);
        assert_eq!(page.last_page, 2);
        let statuses: Vec<ItemStatus> = page.items.iter().map(|i| i.status).collect();
        assert_eq!(
            statuses,
            vec![ItemStatus::Processing, ItemStatus::Pending, ItemStatus::Pending]
        );

        let second = h
            .queue
            .list(&ListFilter {
                page: Some(2),
                per_page: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].status, ItemStatus::Done);
    }

    #[test]
    fn test_list_rejects_large_pages() {
        let h = harness();
        let filter = ListFilter {
            per_page: Some(101),
            ..Default::default()
        };
        assert!(matches!(
            h.queue.list(&filter),
            Err(QueueError::Validation { field: "per_page", .. })
        ));
    }

    #[test]
    fn test_get_unknown_item() {
        let h = harness();
        assert!(matches!(h.queue.get(42), Err(QueueError::NotFound(42))));
    }
}
