// Read pipeline (spec §4.4): resolve which shards a range touches,
// pick one replica per shard via the ring, fan out and concatenate.

use axum::extract::State;
use axum::Json;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app_state::AppState;
use crate::error::RouterResult;
use crate::metadata::{ShardId, StudentRow};

use super::{overlaps, REQUEST_KEY_RANGE};

#[derive(Debug, Deserialize)]
pub struct ReadRequest {
    #[serde(rename = "Stud_id")]
    pub stud_id: Range,
}

#[derive(Debug, Deserialize)]
pub struct Range {
    pub low: i64,
    pub high: i64,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub shards_queried: Vec<ShardId>,
    pub data: Vec<StudentRow>,
    pub status: String,
}

pub async fn read(State(state): State<AppState>, Json(req): Json<ReadRequest>) -> RouterResult<Json<ReadResponse>> {
    let (low, high) = (req.stud_id.low, req.stud_id.high);
    let all_shards = state.metadata.all_shards().await;
    let queried: Vec<_> = all_shards.into_iter().filter(|s| overlaps(s, low, high)).collect();

    let mut shards_queried = Vec::with_capacity(queried.len());
    let mut data = Vec::new();

    for shard in &queried {
        shards_queried.push(shard.shard_id.clone());

        let request_key = rand::rng().random_range(REQUEST_KEY_RANGE);
        let server_id = shard.ring.read().await.get_server_for_request(request_key);
        let Some(server_id) = server_id else {
            warn!(shard = %shard.shard_id, "no replica available for read, skipping");
            continue;
        };

        let endpoint = match state.worker_endpoint(server_id).await {
            Ok(endpoint) => endpoint,
            Err(err) => {
                warn!(shard = %shard.shard_id, server_id, %err, "failed to resolve replica endpoint, skipping");
                continue;
            }
        };

        match state.workers.read(&endpoint, &shard.shard_id, low, high).await {
            Ok(rows) => data.extend(rows),
            Err(err) => {
                warn!(shard = %shard.shard_id, server_id, %err, "read call failed, skipping shard");
            }
        }
    }

    Ok(Json(ReadResponse {
        shards_queried,
        data,
        status: "success".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::config::Config;
    use crate::metadata::SchemaConfig;
    use crate::testing::{InMemorySupervisor, InMemoryWorkerClient};

    use super::*;

    async fn seeded_state() -> AppState {
        let supervisor = Arc::new(InMemorySupervisor::new());
        let workers = Arc::new(InMemoryWorkerClient::new());
        let state = AppState::new(Config::from_env().unwrap(), supervisor, workers);

        let mut placements = HashMap::new();
        placements.insert("Server1".to_string(), vec!["sh1".to_string(), "sh2".to_string()]);

        state
            .metadata
            .apply_init(
                SchemaConfig::default(),
                vec![
                    crate::metadata::ShardSpec {
                        stud_id_low: 0,
                        shard_id: "sh1".to_string(),
                        shard_size: 100,
                    },
                    crate::metadata::ShardSpec {
                        stud_id_low: 100,
                        shard_id: "sh2".to_string(),
                        shard_size: 100,
                    },
                ],
                placements,
            )
            .await;
        state.supervisor.spawn("Server1", 1).await.unwrap();
        state
    }

    #[tokio::test]
    async fn boundary_overlap_queries_both_shards() {
        let state = seeded_state().await;
        let response = read(
            State(state),
            Json(ReadRequest {
                stud_id: Range { low: 50, high: 150 },
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.0.shards_queried, vec!["sh1".to_string(), "sh2".to_string()]);
    }

    #[tokio::test]
    async fn no_replica_skips_shard_without_failing() {
        let supervisor = Arc::new(InMemorySupervisor::new());
        let workers = Arc::new(InMemoryWorkerClient::new());
        let state = AppState::new(Config::from_env().unwrap(), supervisor, workers);
        state
            .metadata
            .apply_init(
                SchemaConfig::default(),
                vec![crate::metadata::ShardSpec {
                    stud_id_low: 0,
                    shard_id: "sh1".to_string(),
                    shard_size: 100,
                }],
                HashMap::new(),
            )
            .await;

        let response = read(
            State(state),
            Json(ReadRequest {
                stud_id: Range { low: 0, high: 100 },
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.0.shards_queried, vec!["sh1".to_string()]);
        assert!(response.0.data.is_empty());
    }
}
