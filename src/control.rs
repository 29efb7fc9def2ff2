// Control-plane handlers: init, add, rm, status (spec §4.3, §6).
// Each decodes a request, validates the count relation, applies the
// registry mutation, drives the external fleet, and replies with the
// literal wire shapes §6 specifies.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::app_state::AppState;
use crate::error::{RouterError, RouterResult};
use crate::metadata::{server_name, NewServerPlacement, SchemaConfig, ServerId, ShardId, ShardSpec, StatusView};

#[derive(Debug, Deserialize)]
pub struct InitRequest {
    #[serde(rename = "N")]
    #[allow(dead_code)]
    pub n: usize,
    pub schema: SchemaConfig,
    pub shards: Vec<ShardSpec>,
    pub servers: HashMap<String, Vec<ShardId>>,
}

#[derive(Debug, Serialize)]
pub struct MessageStatus {
    pub message: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub n: usize,
    pub new_shards: Vec<ShardSpec>,
    pub servers: HashMap<String, Vec<ShardId>>,
}

#[derive(Debug, Serialize)]
pub struct AddResponse {
    #[serde(rename = "N")]
    pub n: usize,
    pub message: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RmRequest {
    pub n: usize,
    pub servers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RmMessage {
    #[serde(rename = "N")]
    pub n: usize,
    pub servers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RmResponse {
    pub message: RmMessage,
    pub status: String,
}

/// Spawn and configure every newly placed server, in submission order.
async fn provision(state: &AppState, schema: &SchemaConfig, new_servers: &[NewServerPlacement]) -> RouterResult<()> {
    for placement in new_servers {
        let hostname = server_name(placement.server_id);
        state.supervisor.spawn(&hostname, placement.server_id).await?;
        let endpoint = state.worker_endpoint(placement.server_id).await?;
        state
            .workers
            .configure(&endpoint, schema, &placement.shard_ids)
            .await?;
    }
    Ok(())
}

/// "Add Server:X, Server:Y and Server:Z" — comma-separated with an
/// " and " before the final element, no serial comma.
fn format_add_message(ids: &[ServerId]) -> String {
    let mut message = String::from("Add ");
    let last = ids.len().saturating_sub(1);
    for (index, id) in ids.iter().enumerate() {
        message.push_str(&format!("Server:{}", id));
        if index == last {
            continue;
        } else if index + 1 == last {
            message.push_str(" and ");
        } else {
            message.push_str(", ");
        }
    }
    message
}

#[instrument(skip_all)]
pub async fn init(State(state): State<AppState>, Json(req): Json<InitRequest>) -> RouterResult<Json<MessageStatus>> {
    let schema = req.schema.clone();
    let shard_count = req.shards.len();
    let new_servers = state.metadata.apply_init(req.schema, req.shards, req.servers).await;
    provision(&state, &schema, &new_servers).await?;

    info!(shards = shard_count, servers = new_servers.len(), "init applied");
    Ok(Json(MessageStatus {
        message: "Configured Database".to_string(),
        status: "success".to_string(),
    }))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusView> {
    Json(state.metadata.snapshot().await)
}

#[instrument(skip_all)]
pub async fn add(State(state): State<AppState>, Json(req): Json<AddRequest>) -> RouterResult<Json<AddResponse>> {
    if req.servers.len() < req.n {
        warn!(requested = req.n, submitted = req.servers.len(), "add rejected: count mismatch");
        return Err(RouterError::CountMismatch(
            "<Error> Number of new servers (n) is greater than newly added instances".to_string(),
        ));
    }

    let schema = state.metadata.snapshot().await.schema;
    let new_servers = state.metadata.apply_add(req.new_shards, req.servers).await;
    provision(&state, &schema, &new_servers).await?;

    let added_ids: Vec<ServerId> = new_servers.iter().map(|p| p.server_id).collect();
    let snapshot = state.metadata.snapshot().await;
    info!(added = added_ids.len(), total = snapshot.n, "add applied");

    Ok(Json(AddResponse {
        n: snapshot.n,
        message: format_add_message(&added_ids),
        status: "successful".to_string(),
    }))
}

#[instrument(skip_all)]
pub async fn rm(State(state): State<AppState>, Json(req): Json<RmRequest>) -> RouterResult<Json<RmResponse>> {
    if req.servers.len() > req.n {
        warn!(requested = req.n, named = req.servers.len(), "rm rejected: count mismatch");
        return Err(RouterError::CountMismatch(
            "<Error> Length of server list is more than removable instances".to_string(),
        ));
    }

    let removed = state.metadata.apply_remove(&req.servers, req.n).await;
    let mut names = Vec::with_capacity(removed.len());
    for server_id in &removed {
        let hostname = server_name(*server_id);
        state.supervisor.stop(&hostname).await?;
        state.supervisor.remove(&hostname).await?;
        names.push(hostname);
    }

    let snapshot = state.metadata.snapshot().await;
    info!(removed = names.len(), remaining = snapshot.n, "rm applied");

    Ok(Json(RmResponse {
        message: RmMessage {
            n: snapshot.n,
            servers: names,
        },
        status: "successful".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_message_single_server() {
        assert_eq!(format_add_message(&[1]), "Add Server:1");
    }

    #[test]
    fn add_message_two_servers() {
        assert_eq!(format_add_message(&[1, 2]), "Add Server:1 and Server:2");
    }

    #[test]
    fn add_message_three_servers() {
        assert_eq!(
            format_add_message(&[1, 2, 3]),
            "Add Server:1, Server:2 and Server:3"
        );
    }
}
