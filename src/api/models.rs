//! Wire types for the `/parser/urls` API
//!
//! Shared by the axum handlers and the worker's HTTP client.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::observability::MetricsSnapshot;
use crate::queue::{
    ClaimDiagnostics, FullScanBefore, ItemError, ListFilter, StatusCounts, UrlResult,
};
use crate::store::WorkItem;

fn default_batch_size() -> usize {
    10
}

fn success() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub supplier_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_type: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reparse_days: Option<u32>,
}

impl From<ClaimRequest> for crate::queue::ClaimRequest {
    fn from(value: ClaimRequest) -> Self {
        Self {
            supplier_name: value.supplier_name,
            material_type: value.material_type.filter(|m| !m.trim().is_empty()),
            batch_size: value.batch_size,
            worker_id: value.worker_id,
            reparse_days: value.reparse_days,
        }
    }
}

/// A leased item as handed to a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimedUrl {
    #[serde(alias = "supplier_url_id")]
    pub item_id: u64,
    pub url: String,
    pub supplier_name: String,
    #[serde(default)]
    pub material_type: Option<String>,
}

impl From<WorkItem> for ClaimedUrl {
    fn from(item: WorkItem) -> Self {
        Self {
            item_id: item.id,
            url: item.url,
            supplier_name: item.supplier_name,
            material_type: item.material_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimResponse {
    #[serde(default = "success")]
    pub success: bool,
    pub urls: Vec<ClaimedUrl>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub results: Vec<UrlResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedCounts {
    pub done: usize,
    pub failed: usize,
    pub blocked: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResponse {
    #[serde(default = "success")]
    pub success: bool,
    pub processed: ProcessedCounts,
    #[serde(default)]
    pub item_errors: Vec<ItemError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseResponse {
    #[serde(default = "success")]
    pub success: bool,
    pub released: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewRequest {
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_ids: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewResponse {
    #[serde(default = "success")]
    pub success: bool,
    pub renewed: usize,
}

/// Optional supplier scope, used by query strings and optional JSON bodies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupplierFilter {
    #[serde(default)]
    pub supplier_name: Option<String>,
}

impl SupplierFilter {
    pub fn supplier(&self) -> Option<&str> {
        self.supplier_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: StatusCounts,
    pub by_supplier: BTreeMap<String, StatusCounts>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticsQuery {
    #[serde(default)]
    pub supplier_name: String,
    #[serde(default)]
    pub material_type: Option<String>,
    #[serde(default)]
    pub reparse_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsResponse {
    pub success: bool,
    pub supplier: String,
    pub diagnostics: ClaimDiagnostics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
    pub reset_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullScanRequest {
    #[serde(default)]
    pub supplier_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullScanAfter {
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullScanResponse {
    pub success: bool,
    pub reset_count: usize,
    pub before: FullScanBefore,
    pub after: FullScanAfter,
    pub supplier: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub supplier_name: Option<String>,
    pub status: Option<String>,
    pub material_type: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl ListQuery {
    pub fn into_filter(self) -> Result<ListFilter, super::validation::RequestValidationError> {
        let status = super::validation::parse_status(self.status.as_deref())?;
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        Ok(ListFilter {
            supplier_name: non_empty(self.supplier_name),
            status,
            material_type: non_empty(self.material_type),
            page: self.page,
            per_page: self.per_page,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMeta {
    pub current_page: usize,
    pub last_page: usize,
    pub per_page: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub data: Vec<WorkItem>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub supplier_name: String,
    #[serde(default)]
    pub supplier_id: Option<String>,
    #[serde(default)]
    pub material_type: Option<String>,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub success: bool,
    pub inserted: usize,
    pub refreshed: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidityRequest {
    pub is_valid: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResponse {
    pub success: bool,
    pub item: WorkItem,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
    pub metrics: MetricsSnapshot,
}
