use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use urlqueue::config::WorkerConfig;

#[derive(Parser, Debug)]
#[command(name = "urlqueue")]
#[command(about = "URL work queue with lease-based claiming", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $URLQUEUE_CONFIG or config/urlqueue.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API and the background sweeper
    Server(ServerArgs),
    /// Reclaim stale leases and promote due retries once, then exit
    Sweep,
    /// Run a worker against a running API
    Worker(WorkerArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct WorkerArgs {
    /// Base URL of the queue API
    #[arg(long, env = "URLQUEUE_API_BASE_URL")]
    pub api_base_url: Option<String>,

    #[arg(long)]
    pub supplier: Option<String>,

    #[arg(long)]
    pub material_type: Option<String>,

    #[arg(long)]
    pub worker_id: Option<String>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Re-claim done items older than this many days
    #[arg(long)]
    pub reparse_days: Option<u32>,

    /// Stop after this many non-empty batches
    #[arg(long)]
    pub max_batches: Option<u32>,
}

impl WorkerArgs {
    /// Overlay command-line flags on the configured worker section
    pub fn apply(self, config: &mut WorkerConfig) {
        if let Some(url) = self.api_base_url {
            config.api_base_url = url;
        }
        if self.supplier.is_some() {
            config.supplier_name = self.supplier;
        }
        if self.material_type.is_some() {
            config.material_type = self.material_type;
        }
        if self.worker_id.is_some() {
            config.worker_id = self.worker_id;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if self.reparse_days.is_some() {
            config.reparse_days = self.reparse_days;
        }
        if self.max_batches.is_some() {
            config.max_batches = self.max_batches;
        }
    }
}
