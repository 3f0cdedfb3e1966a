use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Done,
    Failed,
    Blocked,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 5] = [
        ItemStatus::Pending,
        ItemStatus::Processing,
        ItemStatus::Done,
        ItemStatus::Failed,
        ItemStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Done => "done",
            ItemStatus::Failed => "failed",
            ItemStatus::Blocked => "blocked",
        }
    }

    /// Position in listings: active work first, finished work last
    pub fn list_rank(&self) -> u8 {
        match self {
            ItemStatus::Processing => 0,
            ItemStatus::Pending => 1,
            ItemStatus::Failed => 2,
            ItemStatus::Blocked => 3,
            ItemStatus::Done => 4,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "processing" => Ok(ItemStatus::Processing),
            "done" => Ok(ItemStatus::Done),
            "failed" => Ok(ItemStatus::Failed),
            "blocked" => Ok(ItemStatus::Blocked),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// One URL to visit for one supplier, with lease and retry bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: u64,
    pub url: String,
    pub supplier_name: String,
    #[serde(default)]
    pub supplier_id: Option<String>,
    #[serde(default)]
    pub material_type: Option<String>,
    pub status: ItemStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub locked_by: Option<String>,
    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_parsed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error_code: Option<String>,
    #[serde(default)]
    pub last_error_message: Option<String>,
    pub is_valid: bool,
    #[serde(default)]
    pub validation_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Fields supplied by intake when a URL is first seen
#[derive(Debug, Clone, bon::Builder)]
pub struct NewWorkItem {
    #[builder(into)]
    pub url: String,
    #[builder(into)]
    pub supplier_name: String,
    #[builder(into)]
    pub supplier_id: Option<String>,
    #[builder(into)]
    pub material_type: Option<String>,
    pub collected_at: Option<DateTime<Utc>>,
}

/// `now - window`, or `None` when that instant is not representable. Nothing
/// can be older than an unrepresentable cutoff.
pub fn window_start(now: DateTime<Utc>, window: TimeDelta) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(window)
}

impl WorkItem {
    pub fn new(id: u64, new: NewWorkItem, now: DateTime<Utc>) -> Self {
        Self {
            id,
            url: new.url,
            supplier_name: new.supplier_name,
            supplier_id: new.supplier_id,
            material_type: new.material_type,
            status: ItemStatus::Pending,
            attempts: 0,
            locked_by: None,
            locked_at: None,
            last_attempt_at: None,
            last_parsed_at: None,
            next_retry_at: None,
            last_error_code: None,
            last_error_message: None,
            is_valid: true,
            validation_error: None,
            created_at: now,
            updated_at: now,
            collected_at: new.collected_at.or(Some(now)),
            last_seen_at: Some(now),
        }
    }

    /// A lease whose grant (or last renewal) is older than `ttl`
    pub fn lease_expired(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        match self.locked_at {
            Some(locked_at) => window_start(now, ttl).is_some_and(|cutoff| locked_at < cutoff),
            None => true,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        self.status == ItemStatus::Processing && self.lease_expired(now, ttl)
    }

    pub fn is_actively_leased(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        self.status == ItemStatus::Processing && !self.lease_expired(now, ttl)
    }

    pub fn is_held_by(&self, worker_id: &str) -> bool {
        self.status == ItemStatus::Processing && self.locked_by.as_deref() == Some(worker_id)
    }

    pub fn matches_material(&self, material_type: Option<&str>) -> bool {
        match material_type {
            Some(wanted) => self.material_type.as_deref() == Some(wanted),
            None => true,
        }
    }

    pub fn reparse_due(&self, now: DateTime<Utc>, reparse_window: TimeDelta) -> bool {
        self.status == ItemStatus::Done
            && self.last_parsed_at.is_none_or(|parsed| {
                window_start(now, reparse_window).is_some_and(|cutoff| parsed < cutoff)
            })
    }

    /// Claimable by a fresh lease: valid, unheld, and either pending or due for reparse
    pub fn is_claimable(&self, now: DateTime<Utc>, reparse_window: TimeDelta, ttl: TimeDelta) -> bool {
        if !self.is_valid {
            return false;
        }
        let unheld = self.locked_by.is_none() || self.lease_expired(now, ttl);
        let eligible = self.status == ItemStatus::Pending || self.reparse_due(now, reparse_window);
        unheld && eligible
    }

    pub fn is_retry_ready(&self, now: DateTime<Utc>, max_attempts: u32) -> bool {
        self.status == ItemStatus::Failed
            && self.attempts < max_attempts
            && self.next_retry_at.is_none_or(|at| at <= now)
    }

    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.status == ItemStatus::Failed && self.attempts >= max_attempts
    }

    pub fn lease(&mut self, worker_id: &str, now: DateTime<Utc>) {
        self.status = ItemStatus::Processing;
        self.locked_by = Some(worker_id.to_string());
        self.locked_at = Some(now);
        self.last_attempt_at = Some(now);
        self.updated_at = now;
    }

    pub fn renew(&mut self, now: DateTime<Utc>) {
        self.locked_at = Some(now);
        self.updated_at = now;
    }

    pub fn clear_lease(&mut self) {
        self.locked_by = None;
        self.locked_at = None;
    }

    /// Lease given back without an outcome; attempts stay untouched
    pub fn return_to_pending(&mut self, now: DateTime<Utc>) {
        self.status = ItemStatus::Pending;
        self.clear_lease();
        self.updated_at = now;
    }

    pub fn mark_done(&mut self, completed_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = ItemStatus::Done;
        self.last_parsed_at = Some(completed_at);
        self.next_retry_at = None;
        self.last_error_code = None;
        self.last_error_message = None;
        self.clear_lease();
        self.updated_at = now;
    }

    /// Counts one failed attempt; `next_retry_at` comes from the backoff policy
    pub fn mark_failed(
        &mut self,
        code: String,
        message: Option<String>,
        next_retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.status = ItemStatus::Failed;
        self.attempts = self.attempts.saturating_add(1);
        self.next_retry_at = Some(next_retry_at);
        self.last_error_code = Some(code);
        self.last_error_message = message;
        self.clear_lease();
        self.updated_at = now;
    }

    pub fn mark_blocked(&mut self, code: String, message: Option<String>, now: DateTime<Utc>) {
        self.status = ItemStatus::Blocked;
        self.last_error_code = Some(code);
        self.last_error_message = message;
        self.clear_lease();
        self.updated_at = now;
    }

    /// Administrative reset: back to a fresh pending item
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.status = ItemStatus::Pending;
        self.attempts = 0;
        self.next_retry_at = None;
        self.last_error_code = None;
        self.last_error_message = None;
        self.clear_lease();
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(now: DateTime<Utc>) -> WorkItem {
        let new = NewWorkItem::builder()
            .url("https://shop.example/p/1")
            .supplier_name("acme")
            .material_type("oak")
            .build();
        WorkItem::new(1, new, now)
    }

    #[test]
    fn test_new_item_is_pending_and_claimable() {
        let now = Utc::now();
        let item = item(now);
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert!(item.is_claimable(now, TimeDelta::days(7), TimeDelta::minutes(30)));
        assert!(item.matches_material(Some("oak")));
        assert!(!item.matches_material(Some("pine")));
        assert!(item.matches_material(None));
    }

    #[test]
    fn test_lease_and_expiry() {
        let now = Utc::now();
        let ttl = TimeDelta::minutes(30);
        let mut item = item(now);
        item.lease("w1", now);

        assert!(item.is_held_by("w1"));
        assert!(!item.is_held_by("w2"));
        assert!(item.is_actively_leased(now + TimeDelta::minutes(29), ttl));
        assert!(!item.is_claimable(now + TimeDelta::minutes(29), TimeDelta::days(7), ttl));
        assert!(item.is_stale(now + TimeDelta::minutes(31), ttl));
    }

    #[test]
    fn test_failure_counts_attempt_and_clears_lease() {
        let now = Utc::now();
        let mut item = item(now);
        item.lease("w1", now);
        item.mark_failed("NAV_TIMEOUT".into(), None, now + TimeDelta::minutes(5), now);

        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.attempts, 1);
        assert!(item.locked_by.is_none());
        assert!(!item.is_retry_ready(now, 5));
        assert!(item.is_retry_ready(now + TimeDelta::minutes(5), 5));
        assert!(!item.is_retry_ready(now + TimeDelta::minutes(5), 1));
        assert!(item.is_exhausted(1));
    }

    #[test]
    fn test_done_becomes_due_for_reparse() {
        let now = Utc::now();
        let mut item = item(now);
        item.lease("w1", now);
        item.mark_done(now, now);

        let window = TimeDelta::days(7);
        let ttl = TimeDelta::minutes(30);
        assert!(item.last_parsed_at.is_some());
        assert!(!item.is_claimable(now + TimeDelta::days(6), window, ttl));
        assert!(item.is_claimable(now + TimeDelta::days(8), window, ttl));
    }

    #[test]
    fn test_huge_windows_do_not_overflow() {
        let now = Utc::now();
        let mut item = item(now);
        item.lease("w1", now);
        assert!(!item.lease_expired(now + TimeDelta::days(365), TimeDelta::MAX));
        assert!(item.is_actively_leased(now, TimeDelta::MAX));

        item.mark_done(now, now);
        assert!(!item.reparse_due(now + TimeDelta::days(365), TimeDelta::MAX));
        assert!(!item.is_claimable(now, TimeDelta::MAX, TimeDelta::MAX));
        assert_eq!(window_start(now, TimeDelta::MAX), None);
    }

    #[test]
    fn test_invalid_items_are_never_claimable() {
        let now = Utc::now();
        let mut item = item(now);
        item.is_valid = false;
        assert!(!item.is_claimable(now, TimeDelta::days(7), TimeDelta::minutes(30)));
    }

    #[test]
    fn test_reset_clears_attempts() {
        let now = Utc::now();
        let mut item = item(now);
        item.mark_failed("UNKNOWN".into(), Some("boom".into()), now, now);
        item.reset(now);
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert!(item.last_error_code.is_none());
        assert!(item.next_retry_at.is_none());
    }

    #[test]
    fn test_status_parsing_and_rank() {
        for status in ItemStatus::ALL {
            assert_eq!(status.as_str().parse::<ItemStatus>().unwrap(), status);
        }
        assert!("archived".parse::<ItemStatus>().is_err());
        assert!(ItemStatus::Processing.list_rank() < ItemStatus::Done.list_rank());
    }
}
