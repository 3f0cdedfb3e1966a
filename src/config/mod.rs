//! Configuration management for urlqueue
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use urlqueue::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `URLQUEUE__<section>__<key>`
//!
//! Examples:
//! - `URLQUEUE__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `URLQUEUE__QUEUE__PROCESSING_TTL=45m`
//! - `URLQUEUE__WORKER__SUPPLIER_NAME=acme`
//!
//! The shared API secret is only read from `URLQUEUE_API_TOKEN`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/urlqueue.toml`.
//! This can be overridden using the `URLQUEUE_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{Config, QueueConfig, ServerConfig, WorkerConfig};
pub use validation::{BATCH_SIZE_CAP, ValidationError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path (`--config`), still layered
    /// with environment overrides and secrets
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_path(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
