use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::{MAX_ERROR_MESSAGE_LEN, QueueError, Result, WorkQueue, validate_supplier};
use crate::store::{ItemStatus, NewWorkItem, WorkItem};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub inserted: usize,
    pub refreshed: usize,
    pub rejected: usize,
}

/// Absolute http(s) URL with a host, trimmed
fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    Some(trimmed.to_string())
}

impl WorkQueue {
    /// Insert newly collected URLs as pending items; known URLs only get
    /// their `last_seen_at` refreshed.
    pub fn ingest(
        &self,
        supplier: &str,
        supplier_id: Option<&str>,
        material_type: Option<&str>,
        urls: &[String],
    ) -> Result<IngestSummary> {
        validate_supplier(supplier)?;
        if urls.is_empty() || urls.len() > self.policy.max_ingest_urls {
            return Err(QueueError::validation(
                "urls",
                format!("must contain between 1 and {} entries", self.policy.max_ingest_urls),
            ));
        }

        let summary = self.with_retry("ingest", || {
            let now = self.now();
            self.store.write(|tx| {
                let mut summary = IngestSummary::default();
                for raw in urls {
                    let Some(url) = normalize_url(raw) else {
                        debug!(supplier, url = %raw, "Rejected malformed URL");
                        summary.rejected += 1;
                        continue;
                    };

                    match tx.find_by_url(supplier, &url)? {
                        Some(mut existing) => {
                            existing.last_seen_at = Some(now);
                            existing.updated_at = now;
                            tx.put(&existing)?;
                            summary.refreshed += 1;
                        }
                        None => {
                            let new = NewWorkItem::builder()
                                .url(url)
                                .supplier_name(supplier)
                                .maybe_supplier_id(supplier_id)
                                .maybe_material_type(material_type)
                                .build();
                            tx.insert_new(new, now)?;
                            summary.inserted += 1;
                        }
                    }
                }
                Ok(summary)
            })
        })?;

        info!(
            supplier,
            inserted = summary.inserted,
            refreshed = summary.refreshed,
            rejected = summary.rejected,
            "Ingested URLs"
        );
        self.metrics.items_ingested(summary.inserted);
        Ok(summary)
    }

    /// Flag an item invalid (excluded from every queue operation) or valid again
    pub fn set_validity(&self, item_id: u64, is_valid: bool, error: Option<&str>) -> Result<WorkItem> {
        let error = error
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(|e| e.chars().take(MAX_ERROR_MESSAGE_LEN).collect::<String>());

        let item = self.with_retry("set_validity", || {
            let now = self.now();
            self.store.write(|tx| {
                let mut item = tx.get(item_id)?.ok_or(QueueError::NotFound(item_id))?;
                item.is_valid = is_valid;
                if is_valid {
                    item.validation_error = None;
                } else {
                    item.validation_error = error.clone();
                    if item.status == ItemStatus::Processing {
                        item.return_to_pending(now);
                    } else {
                        item.clear_lease();
                    }
                }
                item.updated_at = now;
                tx.put(&item)?;
                Ok(item)
            })
        })?;

        info!(item_id, is_valid, "Updated item validity");
        Ok(item)
    }
}
