use std::sync::Arc;

use crate::config::Config;
use crate::observability::Metrics;
use crate::queue::WorkQueue;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub queue: WorkQueue,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, queue: WorkQueue, metrics: Arc<Metrics>) -> Self {
        Self {
            config: Arc::new(config),
            queue,
            metrics,
        }
    }
}
