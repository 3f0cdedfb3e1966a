use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde::de::DeserializeOwned;

use super::{
    error::ApiError,
    models::{
        ClaimRequest, ClaimResponse, ClaimedUrl, DiagnosticsQuery, DiagnosticsResponse,
        FullScanAfter, FullScanRequest, FullScanResponse, HealthResponse, IngestRequest,
        IngestResponse, ItemResponse, ListQuery, ListResponse, PageMeta, ProcessedCounts,
        ReleaseRequest, ReleaseResponse, RenewRequest, RenewResponse, ReportRequest,
        ReportResponse, ResetResponse, StatsResponse, SupplierFilter, ValidityRequest,
    },
    state::AppState,
    validation::{require, validate_item_ids},
};
use crate::queue::WorkQueue;

/// Run a synchronous queue operation off the async runtime
async fn blocking<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&WorkQueue) -> crate::queue::Result<T> + Send + 'static,
{
    let queue = state.queue.clone();
    Ok(tokio::task::spawn_blocking(move || op(&queue)).await??)
}

/// Admin endpoints accept an empty body as "no filter"
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}

/// Supplier scope from the query string, falling back to the JSON body
fn supplier_scope(
    query: Result<Query<SupplierFilter>, QueryRejection>,
    body: &Bytes,
) -> Result<Option<String>, ApiError> {
    let Query(query) = query?;
    if let Some(supplier) = query.supplier() {
        return Ok(Some(supplier.to_string()));
    }
    let body: SupplierFilter = optional_json(body)?;
    Ok(body.supplier().map(str::to_string))
}

/// Lease a batch of URLs (POST /parser/urls/claim)
pub async fn claim(
    State(state): State<AppState>,
    payload: Result<Json<ClaimRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let request: crate::queue::ClaimRequest = request.into();

    let items = blocking(&state, move |queue| queue.claim(&request)).await?;
    let urls: Vec<ClaimedUrl> = items.into_iter().map(ClaimedUrl::from).collect();

    Ok(Json(ClaimResponse {
        success: true,
        count: urls.len(),
        urls,
    }))
}

/// Apply worker outcomes (POST /parser/urls/report)
pub async fn report(
    State(state): State<AppState>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;

    let summary = blocking(&state, move |queue| queue.report(&request.results)).await?;

    Ok(Json(ReportResponse {
        success: true,
        processed: ProcessedCounts {
            done: summary.done,
            failed: summary.failed,
            blocked: summary.blocked,
            errors: summary.errors,
        },
        item_errors: summary.item_errors,
    }))
}

/// Give back a worker's leases (POST /parser/urls/release)
pub async fn release(
    State(state): State<AppState>,
    payload: Result<Json<ReleaseRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let supplier = request.supplier_name.filter(|s| !s.trim().is_empty());

    let released = blocking(&state, move |queue| {
        queue.release(&request.worker_id, supplier.as_deref())
    })
    .await?;

    Ok(Json(ReleaseResponse {
        success: true,
        released,
    }))
}

/// Extend a worker's leases (POST /parser/urls/renew)
pub async fn renew(
    State(state): State<AppState>,
    payload: Result<Json<RenewRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    validate_item_ids(request.item_ids.as_deref())?;

    let renewed = blocking(&state, move |queue| {
        queue.renew(&request.worker_id, request.item_ids.as_deref())
    })
    .await?;

    Ok(Json(RenewResponse {
        success: true,
        renewed,
    }))
}

pub async fn stats(
    State(state): State<AppState>,
    query: Result<Query<SupplierFilter>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(filter) = query?;
    let supplier = filter.supplier().map(str::to_string);

    let report = blocking(&state, move |queue| queue.stats(supplier.as_deref())).await?;

    Ok(Json(StatsResponse {
        success: true,
        stats: report.totals,
        by_supplier: report.by_supplier,
    }))
}

pub async fn diagnostics(
    State(state): State<AppState>,
    query: Result<Query<DiagnosticsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    require("supplier_name", &query.supplier_name)?;
    let material = query.material_type.filter(|m| !m.trim().is_empty());
    let supplier = query.supplier_name.clone();

    let diagnostics = blocking(&state, move |queue| {
        queue.claim_diagnostics(&supplier, material.as_deref(), query.reparse_days)
    })
    .await?;

    Ok(Json(DiagnosticsResponse {
        success: true,
        supplier: query.supplier_name,
        diagnostics,
    }))
}

pub async fn reset_stale(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let reset_count = blocking(&state, |queue| queue.reclaim_stale()).await?;
    Ok(Json(ResetResponse {
        success: true,
        reset_count,
    }))
}

pub async fn reset_failed(
    State(state): State<AppState>,
    query: Result<Query<SupplierFilter>, QueryRejection>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let supplier = supplier_scope(query, &body)?;
    let reset_count = blocking(&state, move |queue| queue.reset_failed(supplier.as_deref())).await?;
    Ok(Json(ResetResponse {
        success: true,
        reset_count,
    }))
}

pub async fn retry_ready(
    State(state): State<AppState>,
    query: Result<Query<SupplierFilter>, QueryRejection>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let supplier = supplier_scope(query, &body)?;
    let reset_count = blocking(&state, move |queue| queue.retry_ready(supplier.as_deref())).await?;
    Ok(Json(ResetResponse {
        success: true,
        reset_count,
    }))
}

pub async fn full_scan_reset(
    State(state): State<AppState>,
    payload: Result<Json<FullScanRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    require("supplier_name", &request.supplier_name)?;

    let report = blocking(&state, move |queue| queue.full_scan_reset(&request.supplier_name)).await?;

    Ok(Json(FullScanResponse {
        success: true,
        reset_count: report.reset_count,
        before: report.before,
        after: FullScanAfter {
            pending: report.pending_after,
        },
        supplier: report.supplier,
    }))
}

/// Paginated listing (GET /parser/urls)
pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let filter = query.into_filter()?;

    let page = blocking(&state, move |queue| queue.list(&filter)).await?;

    Ok(Json(ListResponse {
        data: page.items,
        meta: PageMeta {
            current_page: page.current_page,
            last_page: page.last_page,
            per_page: page.per_page,
            total: page.total,
        },
    }))
}

/// Intake of collected URLs (POST /parser/urls/ingest)
pub async fn ingest(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;

    let summary = blocking(&state, move |queue| {
        queue.ingest(
            &request.supplier_name,
            request.supplier_id.as_deref(),
            request.material_type.as_deref(),
            &request.urls,
        )
    })
    .await?;

    let status = if summary.inserted > 0 {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(IngestResponse {
            success: true,
            inserted: summary.inserted,
            refreshed: summary.refreshed,
            rejected: summary.rejected,
        }),
    ))
}

pub async fn get_item(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(item_id) = path.map_err(|e| ApiError::InvalidPayload(e.body_text()))?;
    let item = blocking(&state, move |queue| queue.get(item_id)).await?;
    Ok(Json(ItemResponse {
        success: true,
        item,
    }))
}

pub async fn set_validity(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
    payload: Result<Json<ValidityRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(item_id) = path.map_err(|e| ApiError::InvalidPayload(e.body_text()))?;
    let Json(request) = payload?;

    let item = blocking(&state, move |queue| {
        queue.set_validity(item_id, request.is_valid, request.error.as_deref())
    })
    .await?;

    Ok(Json(ItemResponse {
        success: true,
        item,
    }))
}

/// Health check endpoint (GET /health)
///
/// Checks the store with a snapshot read. Returns 503 when it fails.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());

    let queue = state.queue.clone();
    let store_status = match tokio::task::spawn_blocking(move || queue.store().health_check()).await {
        Ok(Ok(())) => "healthy".to_string(),
        Ok(Err(e)) => format!("unhealthy: {e}"),
        Err(e) => format!("unhealthy: {e}"),
    };
    components.insert("store".to_string(), store_status);

    let all_healthy = components.values().all(|status| status == "healthy");
    let (overall_status, status_code) = if all_healthy {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        metrics: state.metrics.snapshot(),
    };

    (status_code, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_json_accepts_empty_body() {
        let filter: SupplierFilter = optional_json(&Bytes::from_static(b"  \n")).unwrap();
        assert!(filter.supplier_name.is_none());

        let filter: SupplierFilter =
            optional_json(&Bytes::from_static(br#"{"supplier_name": "acme"}"#)).unwrap();
        assert_eq!(filter.supplier(), Some("acme"));

        assert!(optional_json::<SupplierFilter>(&Bytes::from_static(b"{")).is_err());
    }
}
