// Write pipeline (spec §4.5): bucket rows by the shards whose range
// contains their key, then for each affected shard run an isolated
// critical section — snapshot `validIdx`, fan out to every replica,
// check agreement, advance `validIdx` only on full agreement.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tracing::{error, warn};

use crate::app_state::AppState;
use crate::control::MessageStatus;
use crate::error::{RouterError, RouterResult};
use crate::metadata::{ShardId, StudentRow};

use super::overlaps;

#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub data: Vec<StudentRow>,
}

/// Applies one shard's fan-out under its mutex. Returns whether every
/// replica agreed on the resulting index.
async fn apply_shard_write(
    state: &AppState,
    shard_id: &ShardId,
    shard: &crate::metadata::ShardRecord,
    rows: &[StudentRow],
) -> RouterResult<bool> {
    // Fetched from the canonical placement set, not the shard's ring —
    // `/rm`'s asymmetric removal can leave a stale occupant in the ring
    // long after the server itself is stopped and removed (spec §9).
    // Read before taking `valid_idx` below so this never holds the
    // registry lock and a shard lock at once.
    let mut replicas = state.metadata.placements_for_shard(shard_id).await;
    replicas.sort_unstable();

    let mut valid_idx = shard.valid_idx.lock().await;
    let current_index = *valid_idx;
    let expected = current_index + rows.len() as i64;

    let mut agreed = true;
    for server_id in replicas {
        let endpoint = state.worker_endpoint(server_id).await?;
        match state.workers.write(&endpoint, shard_id, current_index, rows).await {
            Ok(returned_index) if returned_index == expected => {}
            Ok(returned_index) => {
                error!(
                    shard = %shard_id,
                    server_id,
                    expected,
                    returned_index,
                    "replica disagreed on resulting index"
                );
                agreed = false;
            }
            Err(err) => {
                error!(shard = %shard_id, server_id, %err, "write call failed");
                agreed = false;
            }
        }
    }

    // No rollback of replicas that already accepted the write (spec §7, §9).
    if agreed {
        *valid_idx = expected;
    }
    Ok(agreed)
}

pub async fn write(State(state): State<AppState>, Json(req): Json<WriteRequest>) -> RouterResult<Json<MessageStatus>> {
    let input_count = req.data.len();
    let shards = state.metadata.all_shards().await;

    let mut buckets: HashMap<ShardId, Vec<StudentRow>> = HashMap::new();
    for shard in &shards {
        let rows: Vec<StudentRow> = req
            .data
            .iter()
            .filter(|row| row.stud_id >= shard.stud_id_low && row.stud_id <= shard.high())
            .cloned()
            .collect();
        if !rows.is_empty() {
            buckets.insert(shard.shard_id.clone(), rows);
        }
    }

    let mut any_disagreement = false;
    for shard in &shards {
        let Some(rows) = buckets.get(&shard.shard_id) else {
            continue;
        };
        match apply_shard_write(&state, &shard.shard_id, shard, rows).await {
            Ok(true) => {}
            Ok(false) => any_disagreement = true,
            Err(err) => {
                warn!(shard = %shard.shard_id, %err, "aborting shard write");
                any_disagreement = true;
            }
        }
    }

    if any_disagreement {
        return Err(RouterError::IndexDisagreement(
            "one or more shard writes failed to reach replica agreement".to_string(),
        ));
    }

    Ok(Json(MessageStatus {
        message: format!("{} Data entries added", input_count),
        status: "success".to_string(),
    }))
}
