use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub fleet: FleetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Settings for the out-of-core collaborators the router drives: the
/// Supervisor (container lifecycle) and the Worker API each spawned
/// server exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub worker_port: u16,
    /// `docker` binds the real container-CLI Supervisor and HTTP
    /// Worker client; `fake` binds the in-memory doubles, for running
    /// the router without a container runtime available.
    pub supervisor_backend: String,
    pub docker_network: String,
    pub docker_image: String,
    pub request_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            server: ServerConfig {
                host: env::var("ROUTER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("ROUTER_PORT")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .unwrap_or(5000),
            },
            fleet: FleetConfig {
                worker_port: env::var("WORKER_PORT")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .unwrap_or(5000),
                supervisor_backend: env::var("SUPERVISOR_BACKEND").unwrap_or_else(|_| "docker".to_string()),
                docker_network: env::var("DOCKER_NETWORK")
                    .unwrap_or_else(|_| "galaxydb-network".to_string()),
                docker_image: env::var("DOCKER_IMAGE")
                    .unwrap_or_else(|_| "galaxydb-server".to_string()),
                request_timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .unwrap_or(5000),
            },
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
