use super::models::{Config, QueueConfig, ServerConfig, WorkerConfig};
use crate::humanize::HumanDuration;
use thiserror::Error;

/// Hard ceiling on claim batch size accepted by the API
pub const BATCH_SIZE_CAP: usize = 100;

/// Upper bound for queue durations (ten years)
pub const MAX_QUEUE_DURATION: HumanDuration = HumanDuration::from_days(3650);

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("max_attempts must be positive")]
    ZeroMaxAttempts,

    #[error("Duration must be positive: {field}")]
    ZeroDuration { field: &'static str },

    #[error("{field} ({actual}) must not exceed {limit}")]
    DurationTooLong {
        field: &'static str,
        actual: String,
        limit: String,
    },

    #[error("Backoff schedule must contain at least one delay")]
    EmptyBackoff,

    #[error("Backoff schedule must be non-decreasing (entry {index} is shorter than its predecessor)")]
    UnsortedBackoff { index: usize },

    #[error("{field} ({actual}) must be between 1 and {limit}")]
    LimitOutOfRange {
        field: &'static str,
        actual: usize,
        limit: usize,
    },

    #[error("worker.renew_interval ({renew}) must be shorter than queue.processing_ttl ({ttl})")]
    RenewIntervalTooLong { renew: String, ttl: String },

    #[error("Invalid worker api_base_url '{url}': {reason}")]
    InvalidApiBaseUrl { url: String, reason: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(&config.server)?;
    validate_queue(&config.queue)?;
    validate_worker(&config.worker, &config.queue)?;
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ValidationError> {
    if server.max_body_bytes == 0 {
        return Err(ValidationError::LimitOutOfRange {
            field: "server.max_body_bytes",
            actual: 0,
            limit: usize::MAX,
        });
    }
    if server.max_concurrent_requests == 0 {
        return Err(ValidationError::LimitOutOfRange {
            field: "server.max_concurrent_requests",
            actual: 0,
            limit: usize::MAX,
        });
    }
    Ok(())
}

fn validate_queue(queue: &QueueConfig) -> Result<(), ValidationError> {
    if queue.max_attempts == 0 {
        return Err(ValidationError::ZeroMaxAttempts);
    }

    if queue.processing_ttl.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "queue.processing_ttl",
        });
    }
    if queue.reparse_interval.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "queue.reparse_interval",
        });
    }

    check_duration("queue.processing_ttl", queue.processing_ttl)?;
    check_duration("queue.reparse_interval", queue.reparse_interval)?;

    if queue.backoff.is_empty() {
        return Err(ValidationError::EmptyBackoff);
    }
    for delay in &queue.backoff {
        check_duration("queue.backoff", *delay)?;
    }
    if let Some(index) = queue
        .backoff
        .windows(2)
        .position(|pair| pair[1] < pair[0])
    {
        return Err(ValidationError::UnsortedBackoff { index: index + 1 });
    }

    check_limit("queue.max_batch_size", queue.max_batch_size, BATCH_SIZE_CAP)?;
    check_limit("queue.max_report_results", queue.max_report_results, 10_000)?;
    check_limit("queue.max_ingest_urls", queue.max_ingest_urls, 10_000)?;

    Ok(())
}

fn validate_worker(worker: &WorkerConfig, queue: &QueueConfig) -> Result<(), ValidationError> {
    let parsed = url::Url::parse(&worker.api_base_url).map_err(|e| {
        ValidationError::InvalidApiBaseUrl {
            url: worker.api_base_url.clone(),
            reason: e.to_string(),
        }
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidApiBaseUrl {
            url: worker.api_base_url.clone(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    check_limit("worker.batch_size", worker.batch_size, queue.max_batch_size)?;
    check_limit("worker.concurrency", worker.concurrency, 1024)?;

    if worker.renew_interval.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "worker.renew_interval",
        });
    }
    if worker.renew_interval >= queue.processing_ttl {
        return Err(ValidationError::RenewIntervalTooLong {
            renew: worker.renew_interval.to_string(),
            ttl: queue.processing_ttl.to_string(),
        });
    }
    if worker.request_timeout.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "worker.request_timeout",
        });
    }

    Ok(())
}

fn check_duration(field: &'static str, actual: HumanDuration) -> Result<(), ValidationError> {
    if actual > MAX_QUEUE_DURATION {
        return Err(ValidationError::DurationTooLong {
            field,
            actual: actual.to_string(),
            limit: MAX_QUEUE_DURATION.to_string(),
        });
    }
    Ok(())
}

fn check_limit(field: &'static str, actual: usize, limit: usize) -> Result<(), ValidationError> {
    if actual == 0 || actual > limit {
        return Err(ValidationError::LimitOutOfRange {
            field,
            actual,
            limit,
        });
    }
    Ok(())
}
