//! API server wiring: runtime selection, startup checks and serving.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use container_runtime::{DockerConfig, DockerRuntime, InMemoryRuntime};
use container_runtime_interface::ContainerRuntime;
use shim_core::{NodeInfo, PodOrchestrator};

use crate::config::{BackendKind, ShimConfig};
use crate::routes::create_router;
use crate::state::ApiState;

pub struct ApiServer {
    config: ShimConfig,
}

impl ApiServer {
    pub fn new(config: ShimConfig) -> Self {
        Self { config }
    }

    /// Connect to the runtime and build the shared state. Fails when the
    /// runtime cannot be reached.
    pub async fn build_state(&self) -> anyhow::Result<ApiState> {
        let runtime = connect_runtime(&self.config).await?;
        runtime
            .ping()
            .await
            .with_context(|| format!("{} runtime did not answer", runtime.name()))?;

        let orchestrator = PodOrchestrator::new(runtime, self.config.orchestrator_config());
        if self.config.adopt_existing {
            let adopted = orchestrator
                .adopt_existing()
                .await
                .context("Failed to list existing containers")?;
            info!(adopted, "Adopted existing pods");
        }

        let node = NodeInfo::new(self.config.node_capacity(), self.config.node_ip.as_deref());
        Ok(ApiState::new(orchestrator, node))
    }

    /// Serve until Ctrl-C or SIGTERM.
    pub async fn run(self) -> anyhow::Result<()> {
        let state = self.build_state().await?;
        info!(
            runtime = state.orchestrator.runtime_name(),
            status_policy = %self.config.status_policy,
            "Runtime ready"
        );

        let listener = TcpListener::bind(self.config.listen)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.listen))?;
        info!(address = %self.config.listen, "Listening");

        axum::serve(listener, create_router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")?;

        info!("Server stopped");
        Ok(())
    }
}

async fn connect_runtime(config: &ShimConfig) -> anyhow::Result<Arc<dyn ContainerRuntime>> {
    match config.backend {
        BackendKind::Docker => {
            let docker_config = DockerConfig {
                socket: config.docker_socket.clone(),
                ..Default::default()
            };
            let runtime = DockerRuntime::with_config(docker_config)
                .await
                .context("Failed to connect to the Docker daemon")?;
            Ok(Arc::new(runtime))
        }
        BackendKind::Memory => Ok(Arc::new(InMemoryRuntime::new())),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
