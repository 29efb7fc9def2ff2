// In-memory fakes for the Supervisor and Worker capability interfaces
// (spec §9: "Express both as capability interfaces so tests can
// substitute in-memory fakes"). Not gated behind `#[cfg(test)]` so
// integration tests under `tests/` can use them too.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use crate::error::{RouterError, RouterResult};
use crate::infrastructure::{Supervisor, WorkerClient};
use crate::metadata::{SchemaConfig, ServerId, ShardId, StudentRow};

#[derive(Default)]
pub struct InMemorySupervisor {
    running: Mutex<HashSet<String>>,
}

impl InMemorySupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_running(&self, hostname: &str) -> bool {
        self.running.lock().await.contains(hostname)
    }
}

#[async_trait]
impl Supervisor for InMemorySupervisor {
    async fn build(&self) -> RouterResult<()> {
        Ok(())
    }

    async fn spawn(&self, hostname: &str, _server_id: ServerId) -> RouterResult<()> {
        self.running.lock().await.insert(hostname.to_string());
        Ok(())
    }

    async fn ip(&self, hostname: &str) -> RouterResult<String> {
        if self.running.lock().await.contains(hostname) {
            Ok(hostname.to_string())
        } else {
            Err(RouterError::Upstream(format!("{} is not running", hostname)))
        }
    }

    async fn stop(&self, hostname: &str) -> RouterResult<()> {
        self.running.lock().await.remove(hostname);
        Ok(())
    }

    async fn remove(&self, _hostname: &str) -> RouterResult<()> {
        Ok(())
    }
}

#[derive(Default, Clone)]
struct ShardStore {
    rows: Vec<StudentRow>,
    index: i64,
}

#[derive(Default)]
struct WorkerState {
    stores: HashMap<(String, String), ShardStore>,
    disagree: HashSet<String>,
    unreachable: HashSet<String>,
}

/// A worker double that keeps its rows and write index in memory,
/// with hooks to simulate the transport and agreement failures §7
/// describes.
#[derive(Default)]
pub struct InMemoryWorkerClient {
    state: Mutex<WorkerState>,
}

impl InMemoryWorkerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subsequent writes to `endpoint` report a stale index, simulating
    /// a replica that silently diverged.
    pub async fn force_disagreement(&self, endpoint: &str) {
        self.state.lock().await.disagree.insert(endpoint.to_string());
    }

    /// Subsequent calls to `endpoint` fail as a transport error.
    pub async fn force_unreachable(&self, endpoint: &str) {
        self.state.lock().await.unreachable.insert(endpoint.to_string());
    }

    pub async fn rows(&self, endpoint: &str, shard_id: &str) -> Vec<StudentRow> {
        self.state
            .lock()
            .await
            .stores
            .get(&(endpoint.to_string(), shard_id.to_string()))
            .map(|s| s.rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WorkerClient for InMemoryWorkerClient {
    async fn configure(&self, endpoint: &str, _schema: &SchemaConfig, shards: &[ShardId]) -> RouterResult<()> {
        let mut state = self.state.lock().await;
        if state.unreachable.contains(endpoint) {
            return Err(RouterError::Upstream(format!("{} unreachable", endpoint)));
        }
        for shard_id in shards {
            state
                .stores
                .entry((endpoint.to_string(), shard_id.clone()))
                .or_default();
        }
        Ok(())
    }

    async fn read(&self, endpoint: &str, shard_id: &str, low: i64, high: i64) -> RouterResult<Vec<StudentRow>> {
        let state = self.state.lock().await;
        if state.unreachable.contains(endpoint) {
            return Err(RouterError::Upstream(format!("{} unreachable", endpoint)));
        }
        let rows = state
            .stores
            .get(&(endpoint.to_string(), shard_id.to_string()))
            .map(|s| {
                s.rows
                    .iter()
                    .filter(|r| r.stud_id >= low && r.stud_id <= high)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn write(
        &self,
        endpoint: &str,
        shard_id: &str,
        current_index: i64,
        data: &[StudentRow],
    ) -> RouterResult<i64> {
        let mut state = self.state.lock().await;
        if state.unreachable.contains(endpoint) {
            return Err(RouterError::Upstream(format!("{} unreachable", endpoint)));
        }
        let disagree = state.disagree.contains(endpoint);
        let store = state
            .stores
            .entry((endpoint.to_string(), shard_id.to_string()))
            .or_default();
        store.rows.extend_from_slice(data);
        store.index = current_index + data.len() as i64;

        if disagree {
            // Accepted the write but reports a stale index — no
            // rollback is issued (spec §7, §9).
            Ok(current_index)
        } else {
            Ok(store.index)
        }
    }

    async fn heartbeat(&self, endpoint: &str) -> RouterResult<()> {
        if self.state.lock().await.unreachable.contains(endpoint) {
            return Err(RouterError::Upstream(format!("{} unreachable", endpoint)));
        }
        Ok(())
    }
}
