use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Directory of the fjall keyspace holding work items
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Shared secret checked against `X-Parser-Token` (loaded from environment, not from config file)
    #[serde(skip)]
    pub api_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_path: default_data_path(),
            max_body_bytes: default_max_body_bytes(),
            max_concurrent_requests: default_max_concurrent_requests(),
            api_token: None,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/urlqueue")
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_max_concurrent_requests() -> usize {
    256
}

/// Queue policy knobs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Lease age after which a `processing` item is reclaimed
    #[serde(default = "default_processing_ttl")]
    pub processing_ttl: HumanDuration,
    /// Age after which a `done` item becomes claimable again
    #[serde(default = "default_reparse_interval")]
    pub reparse_interval: HumanDuration,
    /// Retry delay indexed by attempt count, clamped at the last entry
    #[serde(default = "default_backoff")]
    pub backoff: Vec<HumanDuration>,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_report_results")]
    pub max_report_results: usize,
    #[serde(default = "default_max_ingest_urls")]
    pub max_ingest_urls: usize,
    /// Period of the background sweeper; zero disables it
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: HumanDuration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            processing_ttl: default_processing_ttl(),
            reparse_interval: default_reparse_interval(),
            backoff: default_backoff(),
            max_batch_size: default_max_batch_size(),
            max_report_results: default_max_report_results(),
            max_ingest_urls: default_max_ingest_urls(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_processing_ttl() -> HumanDuration {
    HumanDuration::from_mins(30)
}

fn default_reparse_interval() -> HumanDuration {
    HumanDuration::from_days(7)
}

fn default_backoff() -> Vec<HumanDuration> {
    vec![
        HumanDuration::from_mins(5),
        HumanDuration::from_mins(30),
        HumanDuration::from_hours(2),
        HumanDuration::from_hours(12),
        HumanDuration::from_hours(48),
    ]
}

fn default_max_batch_size() -> usize {
    100
}

fn default_max_report_results() -> usize {
    500
}

fn default_max_ingest_urls() -> usize {
    1000
}

fn default_sweep_interval() -> HumanDuration {
    HumanDuration::from_secs(60)
}

/// Worker loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    pub supplier_name: Option<String>,
    pub material_type: Option<String>,
    /// Generated from hostname and pid when absent
    pub worker_id: Option<String>,
    pub reparse_days: Option<u32>,
    #[serde(default = "default_worker_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_empty_batches")]
    pub max_empty_batches: u32,
    pub max_batches: Option<u32>,
    #[serde(default = "default_empty_backoff")]
    pub empty_backoff: HumanDuration,
    #[serde(default = "default_renew_interval")]
    pub renew_interval: HumanDuration,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            supplier_name: None,
            material_type: None,
            worker_id: None,
            reparse_days: None,
            batch_size: default_worker_batch_size(),
            concurrency: default_concurrency(),
            max_empty_batches: default_max_empty_batches(),
            max_batches: None,
            empty_backoff: default_empty_backoff(),
            renew_interval: default_renew_interval(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_worker_batch_size() -> usize {
    10
}

fn default_concurrency() -> usize {
    4
}

fn default_max_empty_batches() -> u32 {
    3
}

fn default_empty_backoff() -> HumanDuration {
    HumanDuration::from_secs(5)
}

fn default_renew_interval() -> HumanDuration {
    HumanDuration::from_mins(5)
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("urlqueue-worker/", env!("CARGO_PKG_VERSION")).to_string()
}
