// Metadata registry: the router's canonical, in-memory state.
// Holds the schema, the shard table, the placement set, and the
// server set behind a single registry lock, plus one independent
// mutex+ring pair per shard for the data-plane hot path (see spec §5).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{info, warn};

use crate::infrastructure::ring::ConsistentHashMap;

pub type ServerId = i64;
pub type ShardId = String;

pub const SERVER_ID_RANGE: std::ops::Range<ServerId> = 100_000..1_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaConfig {
    pub columns: Vec<String>,
    pub dtypes: Vec<String>,
}

/// A single student record, as carried on the wire and between the
/// router and its workers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentRow {
    #[serde(rename = "Stud_id")]
    pub stud_id: i64,
    #[serde(rename = "Stud_name")]
    pub stud_name: String,
    #[serde(rename = "Stud_marks")]
    pub stud_marks: i64,
}

/// A shard's static layout, as submitted by a control-plane request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardSpec {
    #[serde(rename = "Stud_id_low")]
    pub stud_id_low: i64,
    #[serde(rename = "Shard_id")]
    pub shard_id: ShardId,
    #[serde(rename = "Shard_size")]
    pub shard_size: i64,
}

/// A shard's live state: its key range, its ring, and its write index.
pub struct ShardRecord {
    pub shard_id: ShardId,
    pub stud_id_low: i64,
    pub shard_size: i64,
    pub valid_idx: Mutex<i64>,
    pub ring: RwLock<ConsistentHashMap>,
}

impl ShardRecord {
    fn new(spec: ShardSpec) -> Self {
        Self {
            shard_id: spec.shard_id,
            stud_id_low: spec.stud_id_low,
            shard_size: spec.shard_size,
            valid_idx: Mutex::new(0),
            ring: RwLock::new(ConsistentHashMap::new()),
        }
    }

    /// Inclusive key range `[low, low + size]` (spec §3: both ends
    /// inclusive in write-bucketing and read-overlap).
    pub fn high(&self) -> i64 {
        self.stud_id_low + self.shard_size
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Placement {
    pub shard_id: ShardId,
    pub server_id: ServerId,
}

struct MetadataInner {
    schema: SchemaConfig,
    shards: HashMap<ShardId, Arc<ShardRecord>>,
    /// Insertion order is preserved so `/status` and read fan-in report
    /// shards in a stable, deterministic order.
    shard_order: Vec<ShardId>,
    placements: HashSet<Placement>,
    servers: HashSet<ServerId>,
}

impl MetadataInner {
    fn new() -> Self {
        Self {
            schema: SchemaConfig::default(),
            shards: HashMap::new(),
            shard_order: Vec::new(),
            placements: HashSet::new(),
            servers: HashSet::new(),
        }
    }

    fn insert_shard(&mut self, spec: ShardSpec) -> Arc<ShardRecord> {
        let shard_id = spec.shard_id.clone();
        let record = Arc::new(ShardRecord::new(spec));
        self.shards.insert(shard_id.clone(), record.clone());
        self.shard_order.push(shard_id);
        record
    }

    fn add_placement(&mut self, shard_id: ShardId, server_id: ServerId) {
        self.placements.insert(Placement { shard_id, server_id });
    }

    async fn rebuild_ring(&self, shard_id: &ShardId) {
        let Some(record) = self.shards.get(shard_id) else {
            return;
        };
        let mut ring = ConsistentHashMap::new();
        for placement in &self.placements {
            if &placement.shard_id == shard_id {
                ring.add_server(placement.server_id);
            }
        }
        *record.ring.write().await = ring;
    }
}

/// Derive a server's integer identity from its wire name. `Server<N>`
/// yields `N`; anything else gets a fresh uniform random ID (spec
/// §4.2).
pub fn derive_server_id(name: &str) -> ServerId {
    name.strip_prefix("Server")
        .and_then(|digits| digits.parse::<ServerId>().ok())
        .unwrap_or_else(random_server_id)
}

pub fn random_server_id() -> ServerId {
    rand::rng().random_range(SERVER_ID_RANGE)
}

pub fn server_name(server_id: ServerId) -> String {
    format!("Server{}", server_id)
}

/// A server newly placed by `init`/`add`, paired with the shard IDs it
/// was asked to host — the control-plane handler still has to spawn
/// and configure it out-of-band.
#[derive(Debug, Clone)]
pub struct NewServerPlacement {
    pub server_id: ServerId,
    pub shard_ids: Vec<ShardId>,
}

/// Snapshot returned by `status` and by `init`/`add` after they apply.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    #[serde(rename = "N")]
    pub n: usize,
    pub schema: SchemaConfig,
    pub shards: Vec<ShardSummary>,
    pub servers: HashMap<String, Vec<ShardId>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShardSummary {
    #[serde(rename = "Stud_id_low")]
    pub stud_id_low: i64,
    #[serde(rename = "Shard_id")]
    pub shard_id: ShardId,
    #[serde(rename = "Shard_size")]
    pub shard_size: i64,
    pub valid_idx: i64,
}

/// The registry: one process-wide, lock-protected value (spec §5, §9).
pub struct Metadata {
    inner: Mutex<MetadataInner>,
}

impl Metadata {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetadataInner::new()),
        }
    }

    async fn lock(&self) -> MutexGuard<'_, MetadataInner> {
        self.inner.lock().await
    }

    /// `applyInit`: record the schema, place every server's shards,
    /// then build each declared shard's ring from the placements just
    /// recorded. Returns the servers the caller must spawn and
    /// configure, in submission order.
    pub async fn apply_init(
        &self,
        schema: SchemaConfig,
        shards: Vec<ShardSpec>,
        placement_map: HashMap<String, Vec<ShardId>>,
    ) -> Vec<NewServerPlacement> {
        let mut guard = self.lock().await;
        guard.schema = schema;

        let new_servers = self.place_servers(&mut guard, placement_map);

        let shard_ids: Vec<ShardId> = shards.iter().map(|s| s.shard_id.clone()).collect();
        for spec in shards {
            guard.insert_shard(spec);
        }
        for shard_id in &shard_ids {
            guard.rebuild_ring(shard_id).await;
        }

        info!(shards = shard_ids.len(), servers = new_servers.len(), "applied init");
        new_servers
    }

    /// `applyAdd`: same placement+ring construction as init, restricted
    /// to the newly declared shards.
    pub async fn apply_add(
        &self,
        new_shards: Vec<ShardSpec>,
        placement_map: HashMap<String, Vec<ShardId>>,
    ) -> Vec<NewServerPlacement> {
        let mut guard = self.lock().await;
        let new_servers = self.place_servers(&mut guard, placement_map);

        let shard_ids: Vec<ShardId> = new_shards.iter().map(|s| s.shard_id.clone()).collect();
        for spec in new_shards {
            guard.insert_shard(spec);
        }
        for shard_id in &shard_ids {
            guard.rebuild_ring(shard_id).await;
        }

        info!(shards = shard_ids.len(), servers = new_servers.len(), "applied add");
        new_servers
    }

    /// Shared placement step for init/add: derive each server's ID,
    /// record its placements, register it in the server set, and
    /// report it back for out-of-band spawn+configure. Must run before
    /// the caller builds rings for any newly declared shard.
    fn place_servers(
        &self,
        guard: &mut MetadataInner,
        placement_map: HashMap<String, Vec<ShardId>>,
    ) -> Vec<NewServerPlacement> {
        let mut new_servers = Vec::with_capacity(placement_map.len());
        for (raw_name, shard_ids) in placement_map {
            let server_id = derive_server_id(&raw_name);
            for shard_id in &shard_ids {
                guard.add_placement(shard_id.clone(), server_id);
            }
            guard.servers.insert(server_id);
            new_servers.push(NewServerPlacement { server_id, shard_ids });
        }
        new_servers
    }

    /// `applyRemove`: resolve named servers to IDs, fill the remainder
    /// via random sampling from the remaining pool (stopping if the
    /// pool is exhausted), drop them from `servers`/`placements`, and
    /// remove them from every shard ring they occupied.
    pub async fn apply_remove(&self, named: &[String], n: usize) -> Vec<ServerId> {
        let mut guard = self.lock().await;

        let mut removed: Vec<ServerId> = named.iter().map(|n| derive_server_id(n)).collect();
        let mut removed_set: HashSet<ServerId> = removed.iter().copied().collect();

        if n > removed.len() {
            let mut pool: Vec<ServerId> = guard
                .servers
                .iter()
                .copied()
                .filter(|id| !removed_set.contains(id))
                .collect();
            pool.shuffle(&mut rand::rng());
            let needed = n - removed.len();
            for server_id in pool.into_iter().take(needed) {
                removed.push(server_id);
                removed_set.insert(server_id);
            }
        }

        let mut affected_shards: HashSet<ShardId> = HashSet::new();
        guard.placements.retain(|placement| {
            if removed_set.contains(&placement.server_id) {
                affected_shards.insert(placement.shard_id.clone());
                false
            } else {
                true
            }
        });
        for server_id in &removed {
            guard.servers.remove(server_id);
        }
        for shard_id in &affected_shards {
            if let Some(record) = guard.shards.get(shard_id) {
                let mut ring = record.ring.write().await;
                for server_id in &removed {
                    ring.remove_server(*server_id);
                }
            }
        }

        warn!(removed = removed.len(), "applied remove");
        removed
    }

    /// Acquire the ring+validIdx handle for a shard without holding the
    /// registry lock across any subsequent I/O.
    pub async fn shard(&self, shard_id: &str) -> Option<Arc<ShardRecord>> {
        self.lock().await.shards.get(shard_id).cloned()
    }

    /// All shards, in declaration order — used by the read/write
    /// pipelines to resolve which shards a request touches.
    pub async fn all_shards(&self) -> Vec<Arc<ShardRecord>> {
        let guard = self.lock().await;
        guard
            .shard_order
            .iter()
            .filter_map(|id| guard.shards.get(id).cloned())
            .collect()
    }

    /// Every server currently placed on a shard, read from the
    /// canonical placement set. This is the write pipeline's source of
    /// truth for which replicas to contact (spec §4.5 step 3) — unlike
    /// a shard's ring, it can't go stale after `/rm`'s asymmetric
    /// removal (§9).
    pub async fn placements_for_shard(&self, shard_id: &str) -> Vec<ServerId> {
        let guard = self.lock().await;
        guard
            .placements
            .iter()
            .filter(|p| p.shard_id == shard_id)
            .map(|p| p.server_id)
            .collect()
    }

    /// Every registered server, by wire name, including servers placed
    /// on zero shards. This is the canonical server set `init`/`add`
    /// populate directly (`MetadataInner::servers`) — used by shutdown
    /// to decide what to tear down, as opposed to `snapshot`'s
    /// placement-derived `servers` map, which omits a shard-less
    /// server entirely.
    pub async fn registered_server_names(&self) -> Vec<String> {
        self.lock().await.servers.iter().copied().map(server_name).collect()
    }

    pub async fn snapshot(&self) -> StatusView {
        let guard = self.lock().await;
        let mut servers: HashMap<String, Vec<ShardId>> = HashMap::new();
        for placement in &guard.placements {
            servers
                .entry(server_name(placement.server_id))
                .or_default()
                .push(placement.shard_id.clone());
        }

        let mut shards = Vec::with_capacity(guard.shard_order.len());
        for shard_id in &guard.shard_order {
            if let Some(record) = guard.shards.get(shard_id) {
                shards.push(ShardSummary {
                    stud_id_low: record.stud_id_low,
                    shard_id: record.shard_id.clone(),
                    shard_size: record.shard_size,
                    valid_idx: *record.valid_idx.lock().await,
                });
            }
        }

        // Matches the Go original's statusHandler: N is the size of
        // the placement-derived servers map, not the full registered
        // set (a server placed on zero shards never appears in either
        // `servers` here or its count).
        StatusView {
            n: servers.len(),
            schema: guard.schema.clone(),
            shards,
            servers,
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard_spec(id: &str, low: i64, size: i64) -> ShardSpec {
        ShardSpec {
            stud_id_low: low,
            shard_id: id.to_string(),
            shard_size: size,
        }
    }

    #[tokio::test]
    async fn init_then_snapshot_round_trips() {
        let metadata = Metadata::new();
        let schema = SchemaConfig {
            columns: vec!["Stud_id".into()],
            dtypes: vec!["Number".into()],
        };
        let mut placements = HashMap::new();
        placements.insert("Server1".to_string(), vec!["sh1".to_string()]);
        placements.insert("Server2".to_string(), vec!["sh1".to_string()]);
        placements.insert("Server3".to_string(), vec!["sh1".to_string()]);

        metadata
            .apply_init(schema.clone(), vec![shard_spec("sh1", 0, 4096)], placements)
            .await;

        let status = metadata.snapshot().await;
        assert_eq!(status.n, 3);
        assert_eq!(status.schema.columns, schema.columns);
        assert_eq!(status.servers.len(), 3);
        for shard_ids in status.servers.values() {
            assert_eq!(shard_ids, &vec!["sh1".to_string()]);
        }
    }

    #[tokio::test]
    async fn remove_with_random_fill_reports_exact_count() {
        let metadata = Metadata::new();
        let mut placements = HashMap::new();
        for i in 1..=5 {
            placements.insert(format!("Server{}", i), vec!["sh1".to_string()]);
        }
        metadata
            .apply_init(SchemaConfig::default(), vec![shard_spec("sh1", 0, 100)], placements)
            .await;

        let removed = metadata.apply_remove(&["Server1".to_string()], 3).await;
        assert_eq!(removed.len(), 3);
        assert!(removed.contains(&1));

        let status = metadata.snapshot().await;
        assert_eq!(status.n, 2);
    }

    #[tokio::test]
    async fn remove_fill_stops_when_pool_exhausted() {
        let metadata = Metadata::new();
        let mut placements = HashMap::new();
        placements.insert("Server1".to_string(), vec!["sh1".to_string()]);
        placements.insert("Server2".to_string(), vec!["sh1".to_string()]);
        metadata
            .apply_init(SchemaConfig::default(), vec![shard_spec("sh1", 0, 100)], placements)
            .await;

        let removed = metadata.apply_remove(&["Server1".to_string()], 10).await;
        assert_eq!(removed.len(), 2);
    }

    #[tokio::test]
    async fn ring_reflects_current_placements_after_add() {
        let metadata = Metadata::new();
        let mut placements = HashMap::new();
        placements.insert("Server1".to_string(), vec![]);
        metadata
            .apply_init(SchemaConfig::default(), vec![], placements)
            .await;

        let mut add_placements = HashMap::new();
        add_placements.insert("Server1".to_string(), vec!["sh2".to_string()]);
        metadata
            .apply_add(vec![shard_spec("sh2", 100, 50)], add_placements)
            .await;

        let shard = metadata.shard("sh2").await.expect("shard exists");
        let ring = shard.ring.read().await;
        assert!(ring.occupants().contains(&1));
    }

    #[tokio::test]
    async fn shardless_server_is_registered_but_excluded_from_status_n() {
        let metadata = Metadata::new();
        let mut placements = HashMap::new();
        placements.insert("Server1".to_string(), vec!["sh1".to_string()]);
        placements.insert("Server2".to_string(), vec![]);
        metadata
            .apply_init(SchemaConfig::default(), vec![shard_spec("sh1", 0, 100)], placements)
            .await;

        let status = metadata.snapshot().await;
        assert_eq!(status.n, 1);
        assert!(!status.servers.contains_key("Server2"));

        let mut names = metadata.registered_server_names().await;
        names.sort();
        assert_eq!(names, vec!["Server1".to_string(), "Server2".to_string()]);
    }

    #[tokio::test]
    async fn placements_for_shard_reflects_removal_even_when_ring_lookup_goes_stale() {
        let metadata = Metadata::new();
        let mut placements = HashMap::new();
        placements.insert("Server100001".to_string(), vec!["sh1".to_string()]);
        placements.insert("Server100007".to_string(), vec!["sh1".to_string()]);
        metadata
            .apply_init(SchemaConfig::default(), vec![shard_spec("sh1", 0, 100)], placements)
            .await;

        metadata.apply_remove(&["Server100007".to_string()], 1).await;

        let replicas = metadata.placements_for_shard("sh1").await;
        assert_eq!(replicas, vec![100_001]);
    }
}
