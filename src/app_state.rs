// Shared application state: the registry, the out-of-process
// collaborators, and static configuration, handed to every handler
// through axum's `State` extractor.

use std::sync::Arc;

use crate::config::Config;
use crate::error::RouterResult;
use crate::infrastructure::{Supervisor, WorkerClient};
use crate::metadata::{server_name, Metadata, ServerId};

#[derive(Clone)]
pub struct AppState {
    pub metadata: Arc<Metadata>,
    pub supervisor: Arc<dyn Supervisor>,
    pub workers: Arc<dyn WorkerClient>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config, supervisor: Arc<dyn Supervisor>, workers: Arc<dyn WorkerClient>) -> Self {
        Self {
            metadata: Arc::new(Metadata::new()),
            supervisor,
            workers,
            config,
        }
    }

    /// Resolve a server's current `host:port` for outbound Worker API
    /// calls, by asking the Supervisor for its container IP.
    pub async fn worker_endpoint(&self, server_id: ServerId) -> RouterResult<String> {
        let hostname = server_name(server_id);
        let ip = self.supervisor.ip(&hostname).await?;
        Ok(format!("{}:{}", ip, self.config.fleet.worker_port))
    }
}
