// Core infrastructure modules: out-of-process collaborators the
// router drives (spec §6) and the consistent-hash ring that picks
// replicas within a shard (spec §4.1).
pub mod ring; // Consistent hash ring per shard
pub mod supervisor; // Container lifecycle (Supervisor API)
pub mod worker_client; // Worker API HTTP client

pub use ring::ConsistentHashMap;
pub use supervisor::{DockerSupervisor, Supervisor};
pub use worker_client::{HttpWorkerClient, WorkerClient};
