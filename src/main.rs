// Router entry point: builds the fleet collaborators, serves the
// control and data plane, and tears the fleet down on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use galaxy_router::app_state::AppState;
use galaxy_router::config::Config;
use galaxy_router::infrastructure::{DockerSupervisor, HttpWorkerClient, Supervisor, WorkerClient};
use galaxy_router::server::build_router;
use galaxy_router::testing::{InMemorySupervisor, InMemoryWorkerClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let (supervisor, workers): (Arc<dyn Supervisor>, Arc<dyn WorkerClient>) =
        if config.fleet.supervisor_backend == "fake" {
            (Arc::new(InMemorySupervisor::new()), Arc::new(InMemoryWorkerClient::new()))
        } else {
            (
                Arc::new(DockerSupervisor::new(&config.fleet)),
                Arc::new(HttpWorkerClient::new(Duration::from_millis(config.fleet.request_timeout_ms))?),
            )
        };

    supervisor.build().await?;

    let state = AppState::new(config.clone(), supervisor.clone(), workers);

    let app = build_router(state.clone()).layer(CorsLayer::permissive());

    let addr = config.server_address();
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "router listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state, supervisor))
        .await?;

    Ok(())
}

/// Waits for SIGINT or SIGTERM, then enumerates the live server set
/// and tells the Supervisor to stop and remove each one (spec §5).
async fn shutdown_signal(state: AppState, supervisor: Arc<dyn Supervisor>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            signal.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    warn!("shutting down, tearing down fleet");
    for hostname in state.metadata.registered_server_names().await {
        let _ = supervisor.stop(&hostname).await;
        let _ = supervisor.remove(&hostname).await;
    }
}
