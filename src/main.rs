mod cli;

use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands};
use tracing::info;
use tracing_subscriber::EnvFilter;
use urlqueue::config::Config;
use urlqueue::observability::Metrics;
use urlqueue::queue::{QueuePolicy, WorkQueue};
use urlqueue::store::WorkStore;
use urlqueue::worker::{HttpStatusProcessor, QueueClient, WorkerRunner, WorkerSettings};

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Server(args) => urlqueue::api::run(config, args.address).await?,
        Commands::Sweep => sweep(config).await?,
        Commands::Worker(args) => worker(config, args).await?,
    }

    Ok(())
}

async fn sweep(config: Config) -> Result<(), AnyError> {
    let report = tokio::task::spawn_blocking(move || -> Result<_, AnyError> {
        let store = WorkStore::open(&config.server.data_path)?;
        let queue = WorkQueue::new(store, QueuePolicy::from(&config.queue), Arc::new(Metrics::new()));
        let report = queue.sweep_once()?;
        queue.store().persist()?;
        Ok(report)
    })
    .await??;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn worker(mut config: Config, args: cli::WorkerArgs) -> Result<(), AnyError> {
    args.apply(&mut config.worker);
    let settings = WorkerSettings::from_config(&config.worker, config.server.api_token.clone())?;

    let client = QueueClient::new(
        &settings.api_base_url,
        settings.api_token.clone(),
        settings.request_timeout,
        &settings.user_agent,
    )?;
    let processor = Arc::new(HttpStatusProcessor::new(
        settings.request_timeout,
        &settings.user_agent,
    )?);
    let runner = WorkerRunner::new(client, processor, settings);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, finishing current batch");
            let _ = shutdown_tx.send(true);
        }
    });

    let summary = runner.run(shutdown_rx).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
