// Worker API: the remote HTTP surface each spawned server exposes.
// Out of core per spec §1 — durable per-shard storage and write-index
// bookkeeping live in the worker; the router only speaks this wire
// contract (spec §6).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RouterError, RouterResult};
use crate::metadata::{SchemaConfig, ShardId, StudentRow};

#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// `POST /config` — create the given shards' tables under `schema`.
    async fn configure(&self, endpoint: &str, schema: &SchemaConfig, shards: &[ShardId]) -> RouterResult<()>;

    /// `POST /read` — rows in `[low, high]` for one shard on one replica.
    async fn read(&self, endpoint: &str, shard_id: &str, low: i64, high: i64) -> RouterResult<Vec<StudentRow>>;

    /// `POST /write` — append `data` to one shard on one replica,
    /// starting at `current_index`. Returns the replica's resulting
    /// index (`current_index + data.len()` on success).
    async fn write(
        &self,
        endpoint: &str,
        shard_id: &str,
        current_index: i64,
        data: &[StudentRow],
    ) -> RouterResult<i64>;

    /// `GET /heartbeat` — liveness probe. Not called by any handler in
    /// this crate; present for a future health-check loop.
    async fn heartbeat(&self, endpoint: &str) -> RouterResult<()>;
}

#[derive(Serialize)]
struct ConfigPayload<'a> {
    schema: &'a SchemaConfig,
    shards: &'a [ShardId],
}

#[derive(Serialize)]
struct StudRange {
    low: i64,
    high: i64,
}

#[derive(Serialize)]
struct ReadPayload<'a> {
    shard: &'a str,
    #[serde(rename = "Stud_id")]
    stud_id: StudRange,
}

#[derive(Deserialize)]
struct ReadResponse {
    #[allow(dead_code)]
    status: String,
    data: Vec<StudentRow>,
}

#[derive(Serialize)]
struct WritePayload<'a> {
    shard: &'a str,
    curr_idx: i64,
    data: &'a [StudentRow],
}

#[derive(Deserialize)]
struct WriteResponse {
    #[allow(dead_code)]
    status: String,
    #[allow(dead_code)]
    message: String,
    current_idx: i64,
}

/// `reqwest`-backed implementation, bound to a fixed per-call timeout
/// (spec §5: the original has none, implementations should impose one).
pub struct HttpWorkerClient {
    client: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new(timeout: Duration) -> RouterResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RouterError::Upstream(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn configure(&self, endpoint: &str, schema: &SchemaConfig, shards: &[ShardId]) -> RouterResult<()> {
        let payload = ConfigPayload { schema, shards };
        self.client
            .post(format!("http://{}/config", endpoint))
            .json(&payload)
            .send()
            .await
            .map_err(|e| RouterError::Upstream(format!("config call to {} failed: {}", endpoint, e)))?;
        Ok(())
    }

    async fn read(&self, endpoint: &str, shard_id: &str, low: i64, high: i64) -> RouterResult<Vec<StudentRow>> {
        let payload = ReadPayload {
            shard: shard_id,
            stud_id: StudRange { low, high },
        };
        let response = self
            .client
            .post(format!("http://{}/read", endpoint))
            .json(&payload)
            .send()
            .await
            .map_err(|e| RouterError::Upstream(format!("read call to {} failed: {}", endpoint, e)))?
            .json::<ReadResponse>()
            .await
            .map_err(|e| RouterError::Upstream(format!("malformed read response from {}: {}", endpoint, e)))?;
        Ok(response.data)
    }

    async fn write(
        &self,
        endpoint: &str,
        shard_id: &str,
        current_index: i64,
        data: &[StudentRow],
    ) -> RouterResult<i64> {
        let payload = WritePayload {
            shard: shard_id,
            curr_idx: current_index,
            data,
        };
        let response = self
            .client
            .post(format!("http://{}/write", endpoint))
            .json(&payload)
            .send()
            .await
            .map_err(|e| RouterError::Upstream(format!("write call to {} failed: {}", endpoint, e)))?
            .json::<WriteResponse>()
            .await
            .map_err(|e| RouterError::Upstream(format!("malformed write response from {}: {}", endpoint, e)))?;
        Ok(response.current_idx)
    }

    async fn heartbeat(&self, endpoint: &str) -> RouterResult<()> {
        self.client
            .get(format!("http://{}/heartbeat", endpoint))
            .send()
            .await
            .map_err(|e| RouterError::Upstream(format!("heartbeat to {} failed: {}", endpoint, e)))?;
        Ok(())
    }
}
