use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{MAX_ERROR_CODE_LEN, MAX_ERROR_MESSAGE_LEN, QueueError, Result, WorkQueue};
use crate::store::ItemStatus;

pub const DEFAULT_FAILED_CODE: &str = "UNKNOWN";
pub const DEFAULT_BLOCKED_CODE: &str = "HTTP_403";

/// Terminal outcome a worker reports for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportOutcome {
    Done,
    Failed,
    Blocked,
}

/// One processed item as reported by a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlResult {
    #[serde(alias = "supplier_url_id")]
    pub item_id: u64,
    pub status: ReportOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, alias = "parsed_at", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl UrlResult {
    pub fn new(item_id: u64, status: ReportOutcome) -> Self {
        Self {
            item_id,
            status,
            error_code: None,
            error_message: None,
            completed_at: None,
        }
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub item_id: u64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub done: usize,
    pub failed: usize,
    pub blocked: usize,
    pub errors: usize,
    pub item_errors: Vec<ItemError>,
}

impl ReportSummary {
    fn record_error(&mut self, item_id: u64, message: impl Into<String>) {
        self.errors += 1;
        self.item_errors.push(ItemError {
            item_id,
            message: message.into(),
        });
    }
}

fn truncate_chars(value: String, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((cut, _)) => value[..cut].to_string(),
        None => value,
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl WorkQueue {
    /// Apply a batch of outcomes. Each result commits on its own; one bad
    /// result never aborts the rest of the batch.
    pub fn report(&self, results: &[UrlResult]) -> Result<ReportSummary> {
        if results.is_empty() || results.len() > self.policy.max_report_results {
            return Err(QueueError::validation(
                "results",
                format!("must contain between 1 and {} entries", self.policy.max_report_results),
            ));
        }

        let mut summary = ReportSummary::default();

        for result in results {
            let code = non_empty(result.error_code.as_ref());
            if code
                .as_ref()
                .is_some_and(|c| c.chars().count() > MAX_ERROR_CODE_LEN)
            {
                summary.record_error(
                    result.item_id,
                    format!("error_code exceeds {} characters", MAX_ERROR_CODE_LEN),
                );
                continue;
            }
            let message = non_empty(result.error_message.as_ref())
                .map(|m| truncate_chars(m, MAX_ERROR_MESSAGE_LEN));

            match self.apply_result(result, code, message) {
                Ok(()) => match result.status {
                    ReportOutcome::Done => summary.done += 1,
                    ReportOutcome::Failed => summary.failed += 1,
                    ReportOutcome::Blocked => summary.blocked += 1,
                },
                Err(QueueError::NotFound(id)) => {
                    summary.record_error(id, format!("work item {} not found", id))
                }
                Err(QueueError::Validation { message, .. }) => {
                    summary.record_error(result.item_id, message)
                }
                Err(err) => return Err(err),
            }
        }

        self.metrics
            .reported(summary.done, summary.failed, summary.blocked, summary.errors);

        if summary.errors > 0 {
            warn!(
                done = summary.done,
                failed = summary.failed,
                blocked = summary.blocked,
                errors = summary.errors,
                "Report applied with item errors"
            );
        } else {
            info!(
                done = summary.done,
                failed = summary.failed,
                blocked = summary.blocked,
                "Report applied"
            );
        }

        Ok(summary)
    }

    fn apply_result(
        &self,
        result: &UrlResult,
        code: Option<String>,
        message: Option<String>,
    ) -> Result<()> {
        self.with_retry("report", || {
            let now = self.now();
            self.store.write(|tx| {
                let mut item = tx.get(result.item_id)?.ok_or(QueueError::NotFound(result.item_id))?;
                if !item.is_valid {
                    return Err(QueueError::validation("item_id", "work item is flagged invalid"));
                }

                match result.status {
                    ReportOutcome::Done => {
                        item.mark_done(result.completed_at.unwrap_or(now), now);
                    }
                    ReportOutcome::Failed => {
                        // Attempts count once per claim cycle
                        if item.status == ItemStatus::Failed && item.locked_by.is_none() {
                            return Ok(());
                        }
                        let next_retry_at = self.policy.backoff.next_retry_at(item.attempts + 1, now);
                        item.mark_failed(
                            code.clone().unwrap_or_else(|| DEFAULT_FAILED_CODE.to_string()),
                            message.clone(),
                            next_retry_at,
                            now,
                        );
                    }
                    ReportOutcome::Blocked => {
                        item.mark_blocked(
                            code.clone().unwrap_or_else(|| DEFAULT_BLOCKED_CODE.to_string()),
                            message.clone(),
                            now,
                        );
                    }
                }

                tx.put(&item)?;
                Ok(())
            })
        })
    }
}
