//! Docker Engine container runtime.
//!
//! Talks to a local Docker (or API-compatible) daemon over its Unix socket
//! through `bollard`.
//!
//! # Requirements
//!
//! - A running daemon reachable at the configured socket (or the client's
//!   local defaults, which honour `DOCKER_HOST`)
//! - Permission to use the socket

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions as DockerCreateOptions, InspectContainerOptions,
    ListContainersOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use chrono::DateTime;
use futures_util::StreamExt;
use tracing::{debug, info};

use container_runtime_interface::{
    BackendHandle, ContainerRuntime, ContainerSummary, CreateContainerOptions, LabelSelector,
    LogOptions, LogStream, PullProgress, PullStream, RuntimeError, RuntimeState,
};

/// Errors raised while setting up the Docker client.
#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error("Docker client error: {0}")]
    Client(#[from] bollard::errors::Error),

    #[error("Docker daemon at {target} did not answer: {message}")]
    Ping { target: String, message: String },
}

impl From<DockerError> for RuntimeError {
    fn from(err: DockerError) -> Self {
        RuntimeError::Unavailable(err.to_string())
    }
}

/// Configuration for [`DockerRuntime`].
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Unix socket of the daemon. `None` uses the client's local defaults.
    pub socket: Option<PathBuf>,
    /// Client-side request timeout (default: 120s)
    pub request_timeout: Duration,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: None,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Runtime backed by a Docker daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
    target: String,
}

impl DockerRuntime {
    /// Connect and verify the daemon answers.
    pub async fn with_config(config: DockerConfig) -> Result<Self, DockerError> {
        let (docker, target) = match &config.socket {
            Some(socket) => {
                let path = socket.to_string_lossy().to_string();
                let docker = Docker::connect_with_socket(
                    &path,
                    config.request_timeout.as_secs(),
                    bollard::API_DEFAULT_VERSION,
                )?;
                (docker, path)
            }
            None => (
                Docker::connect_with_local_defaults()?.with_timeout(config.request_timeout),
                "local defaults".to_string(),
            ),
        };

        let runtime = Self { docker, target };
        runtime.verify().await?;
        Ok(runtime)
    }

    async fn verify(&self) -> Result<(), DockerError> {
        let version = self.docker.version().await.map_err(|e| DockerError::Ping {
            target: self.target.clone(),
            message: describe(&e),
        })?;

        info!(
            "DockerRuntime connected to {} (engine {}, api {})",
            self.target,
            version.version.as_deref().unwrap_or("unknown"),
            version.api_version.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }
}

/// The daemon's own message when it sent one, otherwise the client error.
fn describe(err: &bollard::errors::Error) -> String {
    match err {
        bollard::errors::Error::DockerResponseServerError { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Split a reference into the `fromImage`/`tag` pair the pull endpoint
/// expects. A missing tag means `latest`, never "every tag".
fn split_image_reference(reference: &str) -> (String, String) {
    if reference.contains('@') {
        return (reference.to_string(), String::new());
    }
    let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[name_start..].rfind(':') {
        Some(colon) => {
            let split = name_start + colon;
            (
                reference[..split].to_string(),
                reference[split + 1..].to_string(),
            )
        }
        None => (reference.to_string(), "latest".to_string()),
    }
}

/// Docker only reports exit codes inside its status text, e.g.
/// `Exited (137) 5 minutes ago`.
fn parse_exit_code(status: &str) -> Option<i64> {
    let rest = status.strip_prefix("Exited (")?;
    let end = rest.find(')')?;
    rest[..end].parse().ok()
}

fn label_filters(selector: &LabelSelector) -> HashMap<String, Vec<String>> {
    let labels = selector
        .requirements()
        .map(|(key, value)| match value {
            Some(value) => format!("{key}={value}"),
            None => key.to_string(),
        })
        .collect();
    HashMap::from([("label".to_string(), labels)])
}

fn to_summary(container: bollard::models::ContainerSummary) -> Option<ContainerSummary> {
    let id = container.id?;
    let name = container
        .names
        .and_then(|names| names.into_iter().next())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.clone());
    let exit_code = container.status.as_deref().and_then(parse_exit_code);

    Some(ContainerSummary {
        handle: BackendHandle::new(id),
        name,
        image: container.image.unwrap_or_default(),
        labels: container.labels.unwrap_or_default(),
        state: container
            .state
            .as_deref()
            .map(RuntimeState::from)
            .unwrap_or(RuntimeState::Unknown),
        created_at: container
            .created
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        exit_code,
    })
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Unavailable(describe(&e)))
    }

    async fn list_by_label(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all: true,
            filters: label_filters(selector),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("ContainerList failed: {}", describe(&e))))?;

        debug!("DockerRuntime: Listed {} containers", containers.len());
        Ok(containers.into_iter().filter_map(to_summary).collect())
    }

    async fn pull_image(&self, image: &str) -> Result<PullStream, RuntimeError> {
        let (from_image, tag) = split_image_reference(image);
        info!("DockerRuntime: Pulling image {}:{}", from_image, tag);

        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };
        let image = image.to_string();

        let stream = self
            .docker
            .create_image(Some(options), None, None)
            .map(move |item| match item {
                Ok(info) => match info.error {
                    Some(reason) => Err(RuntimeError::ImagePullFailed {
                        image: image.clone(),
                        reason,
                    }),
                    None => Ok(PullProgress {
                        status: info.status.unwrap_or_default(),
                        layer: info.id,
                        progress: info.progress,
                    }),
                },
                Err(e) => Err(RuntimeError::ImagePullFailed {
                    image: image.clone(),
                    reason: describe(&e),
                }),
            });

        Ok(stream.boxed())
    }

    async fn create(&self, options: &CreateContainerOptions) -> Result<BackendHandle, RuntimeError> {
        let config = Config {
            image: Some(options.image.clone()),
            labels: Some(options.labels.clone()),
            ..Default::default()
        };
        let create_options = DockerCreateOptions {
            name: options.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .map_err(|e| RuntimeError::CreateFailed(describe(&e)))?;

        for warning in &response.warnings {
            debug!("DockerRuntime: create {}: {}", options.name, warning);
        }
        Ok(BackendHandle::new(response.id))
    }

    async fn start(&self, handle: &BackendHandle) -> Result<(), RuntimeError> {
        self.docker
            .start_container(handle.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::StartFailed(describe(&e)))
    }

    async fn remove(&self, handle: &BackendHandle, force: bool) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.docker
            .remove_container(handle.as_str(), Some(options))
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    RuntimeError::NotFound(handle.to_string())
                } else {
                    RuntimeError::RemoveFailed(describe(&e))
                }
            })
    }

    async fn stream_logs(
        &self,
        reference: &str,
        options: &LogOptions,
    ) -> Result<LogStream, RuntimeError> {
        // The log endpoint only reports a missing container inside the
        // stream; resolve it first so the caller gets the error up front.
        self.docker
            .inspect_container(reference, None::<InspectContainerOptions>)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    RuntimeError::NotFound(reference.to_string())
                } else {
                    RuntimeError::LogsFailed(describe(&e))
                }
            })?;

        let logs_options = LogsOptions::<String> {
            follow: options.follow,
            stdout: true,
            stderr: true,
            timestamps: options.timestamps,
            tail: options
                .tail
                .map(|n| n.to_string())
                .unwrap_or_else(|| "all".to_string()),
            ..Default::default()
        };

        let stream = self
            .docker
            .logs(reference, Some(logs_options))
            .map(|item| {
                item.map(|output| output.into_bytes())
                    .map_err(|e| RuntimeError::LogsFailed(describe(&e)))
            });

        Ok(stream.boxed())
    }
}
