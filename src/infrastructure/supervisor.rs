// Supervisor API: container/process lifecycle for worker instances.
// Out of core per spec §1 — this is the interface the core consumes,
// expressed as a capability trait so production can bind to the
// container CLI while tests substitute an in-memory fake (spec §9).

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::FleetConfig;
use crate::error::{RouterError, RouterResult};
use crate::metadata::ServerId;

#[async_trait]
pub trait Supervisor: Send + Sync {
    /// One-time image preparation at startup.
    async fn build(&self) -> RouterResult<()>;
    /// Start a worker container in the fleet network with env `id=<server_id>`.
    async fn spawn(&self, hostname: &str, server_id: ServerId) -> RouterResult<()>;
    /// Resolve a running container's IP for HTTP calls.
    async fn ip(&self, hostname: &str) -> RouterResult<String>;
    async fn stop(&self, hostname: &str) -> RouterResult<()>;
    async fn remove(&self, hostname: &str) -> RouterResult<()>;
}

/// Docker-backed Supervisor, mirroring the shell-outs the original
/// implementation made via `os/exec` (see `original_source/loadbalancer/utils.go`).
pub struct DockerSupervisor {
    network: String,
    image: String,
}

impl DockerSupervisor {
    pub fn new(config: &FleetConfig) -> Self {
        Self {
            network: config.docker_network.clone(),
            image: config.docker_image.clone(),
        }
    }

    async fn run(&self, args: &[&str]) -> RouterResult<std::process::Output> {
        let output = Command::new("sudo")
            .arg("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| RouterError::Upstream(format!("failed to invoke docker: {}", e)))?;
        Ok(output)
    }
}

#[async_trait]
impl Supervisor for DockerSupervisor {
    async fn build(&self) -> RouterResult<()> {
        let output = self
            .run(&["build", "--tag", &self.image, "/server"])
            .await?;
        if !output.status.success() {
            return Err(RouterError::Upstream(format!(
                "failed to build server image: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        info!(image = %self.image, "built server image");
        Ok(())
    }

    async fn spawn(&self, hostname: &str, server_id: ServerId) -> RouterResult<()> {
        let id_env = format!("id={}", server_id);
        let image_tag = format!("{}:latest", self.image);
        let output = self
            .run(&[
                "run", "-d", "--name", hostname, "--network", &self.network, "-e", &id_env,
                &image_tag,
            ])
            .await?;
        if !output.status.success() {
            return Err(RouterError::Upstream(format!(
                "failed to start server instance {}: {}",
                hostname,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        info!(hostname, server_id, "spawned server instance");
        Ok(())
    }

    async fn ip(&self, hostname: &str) -> RouterResult<String> {
        let output = self
            .run(&[
                "inspect",
                "-f",
                "{{range .NetworkSettings.Networks}}{{.IPAddress}}{{end}}",
                hostname,
            ])
            .await?;
        if !output.status.success() {
            return Err(RouterError::Upstream(format!(
                "failed to inspect {}: {}",
                hostname,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn stop(&self, hostname: &str) -> RouterResult<()> {
        let output = self.run(&["stop", hostname]).await?;
        if !output.status.success() {
            warn!(hostname, "failed to stop server instance");
        }
        Ok(())
    }

    async fn remove(&self, hostname: &str) -> RouterResult<()> {
        let output = self.run(&["rm", hostname]).await?;
        if !output.status.success() {
            warn!(hostname, "failed to remove server instance");
        }
        Ok(())
    }
}
