//! Process configuration, read from flags and the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use shim_core::{OrchestratorConfig, StatusPolicy};
use shim_shared_types::NodeCapacity;

/// Container runtime the shim drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// A Docker (or API-compatible) daemon.
    Docker,
    /// Simulated runtime kept in process memory.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "vk-web-shim")]
#[command(version)]
#[command(about = "Node-agent shim running orchestrator pods on a container runtime", long_about = None)]
pub struct ShimConfig {
    /// HTTP listen address
    #[arg(long, default_value = "0.0.0.0:3000", env = "VK_SHIM_LISTEN")]
    pub listen: SocketAddr,

    /// Address reported by /nodeAddresses
    #[arg(long, env = "VKUBELET_POD_IP")]
    pub node_ip: Option<String>,

    #[arg(long, value_enum, default_value_t = BackendKind::Docker, env = "VK_SHIM_BACKEND")]
    pub backend: BackendKind,

    /// Unix socket of the Docker daemon (local defaults when unset)
    #[arg(long, env = "VK_SHIM_DOCKER_SOCKET")]
    pub docker_socket: Option<PathBuf>,

    /// Deadline for each list/create/start/remove/log call
    #[arg(long, default_value_t = 30, env = "VK_SHIM_BACKEND_TIMEOUT_SECS")]
    pub backend_timeout_secs: u64,

    /// Deadline for an image pull to finish
    #[arg(long, default_value_t = 600, env = "VK_SHIM_PULL_TIMEOUT_SECS")]
    pub pull_timeout_secs: u64,

    /// `observed` reports the runtime's state, `fixed` always reports Running
    #[arg(long, default_value = "observed", env = "VK_SHIM_STATUS_POLICY")]
    pub status_policy: StatusPolicy,

    #[arg(long, default_value = "20", env = "VK_SHIM_CAPACITY_CPU")]
    pub capacity_cpu: String,

    #[arg(long, default_value = "100Gi", env = "VK_SHIM_CAPACITY_MEMORY")]
    pub capacity_memory: String,

    #[arg(long, default_value = "20", env = "VK_SHIM_CAPACITY_PODS")]
    pub capacity_pods: String,

    /// Register pods for managed containers found at startup
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "VK_SHIM_ADOPT_EXISTING"
    )]
    pub adopt_existing: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, env = "VK_SHIM_LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl ShimConfig {
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            backend_timeout: Duration::from_secs(self.backend_timeout_secs),
            pull_timeout: Duration::from_secs(self.pull_timeout_secs),
            status_policy: self.status_policy,
        }
    }

    pub fn node_capacity(&self) -> NodeCapacity {
        NodeCapacity {
            cpu: self.capacity_cpu.clone(),
            memory: self.capacity_memory.clone(),
            pods: self.capacity_pods.clone(),
        }
    }
}
