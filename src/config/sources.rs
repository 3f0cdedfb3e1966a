use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "URLQUEUE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/urlqueue.toml";
const ENV_PREFIX: &str = "URLQUEUE";
const ENV_SEPARATOR: &str = "__";
const API_TOKEN_ENV_VAR: &str = "URLQUEUE_API_TOKEN";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_path(config_path)
}

/// Same layering as [`load`] with an explicit file path
pub fn load_path(config_path: PathBuf) -> Result<Config, ConfigError> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);

    Ok(config)
}

/// Secrets are never stored in TOML files, only in environment
fn load_secrets(config: &mut Config) {
    config.server.api_token = env::var(API_TOKEN_ENV_VAR)
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // URLQUEUE__QUEUE__MAX_ATTEMPTS -> queue.max_attempts
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::HumanDuration;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.processing_ttl, HumanDuration::from_mins(30));
        assert_eq!(config.queue.backoff.len(), 5);
        assert!(config.server.api_token.is_none());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"
data_path = "/var/lib/urlqueue"

[queue]
max_attempts = 3
processing_ttl = "10m"
reparse_interval = "3d"
backoff = ["1m", "10m", "1h"]
sweep_interval = 0

[worker]
supplier_name = "acme"
batch_size = 25
renew_interval = "2m"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.server.data_path, PathBuf::from("/var/lib/urlqueue"));
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.processing_ttl, HumanDuration::from_mins(10));
        assert_eq!(config.queue.reparse_interval, HumanDuration::from_days(3));
        assert_eq!(
            config.queue.backoff,
            vec![
                HumanDuration::from_mins(1),
                HumanDuration::from_mins(10),
                HumanDuration::from_hours(1)
            ]
        );
        assert!(config.queue.sweep_interval.is_zero());
        assert_eq!(config.worker.supplier_name.as_deref(), Some("acme"));
        assert_eq!(config.worker.batch_size, 25);
        assert_eq!(config.worker.renew_interval, HumanDuration::from_mins(2));
    }

    #[test]
    fn test_api_token_not_read_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[server]\napi_token = \"from-file\"\n").unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert!(config.server.api_token.is_none());
    }
}
