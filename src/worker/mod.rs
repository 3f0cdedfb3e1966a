//! Worker side of the queue protocol
//!
//! A worker loops claim -> process -> report against the HTTP API, renews
//! its leases while a batch is in flight and releases whatever it still
//! holds on exit.

pub mod client;
pub mod processor;
pub mod runner;

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

pub use client::{ClientError, QueueClient};
pub use processor::{HttpStatusProcessor, PageProcessor};
pub use runner::{WorkerRunner, WorkerSummary};

use crate::config::WorkerConfig;
use crate::queue::MAX_WORKER_ID_LEN;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("supplier_name is required to run a worker")]
    MissingSupplier,

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Resolved worker settings
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub supplier_name: String,
    pub material_type: Option<String>,
    pub worker_id: String,
    pub reparse_days: Option<u32>,
    pub batch_size: usize,
    pub concurrency: usize,
    pub max_empty_batches: u32,
    pub max_batches: Option<u32>,
    pub empty_backoff: Duration,
    pub renew_interval: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl WorkerSettings {
    pub fn from_config(
        config: &WorkerConfig,
        api_token: Option<String>,
    ) -> Result<Self, WorkerError> {
        let supplier_name = config
            .supplier_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(WorkerError::MissingSupplier)?
            .to_string();

        let worker_id = config
            .worker_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_worker_id);

        Ok(Self {
            api_base_url: config.api_base_url.clone(),
            api_token,
            supplier_name,
            material_type: config.material_type.clone().filter(|m| !m.trim().is_empty()),
            worker_id,
            reparse_days: config.reparse_days,
            batch_size: config.batch_size,
            concurrency: config.concurrency.max(1),
            max_empty_batches: config.max_empty_batches.max(1),
            max_batches: config.max_batches,
            empty_backoff: config.empty_backoff.as_std(),
            renew_interval: config.renew_interval.as_std(),
            request_timeout: config.request_timeout.as_std(),
            user_agent: config.user_agent.clone(),
        })
    }
}

/// `<host>-<pid>-<random>`, cut to the queue's worker id limit
pub fn generate_worker_id() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "worker".to_string());
    let suffix = Uuid::new_v4().simple().to_string();
    let id = format!("{}-{}-{}", host.trim(), std::process::id(), &suffix[..8]);
    id.chars().take(MAX_WORKER_ID_LEN).collect()
}
