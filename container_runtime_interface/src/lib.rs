//! Capability interface between the pod lifecycle core and a container
//! runtime.
//!
//! The orchestrator only ever talks to a [`ContainerRuntime`]; concrete
//! implementations (a live runtime, an in-memory simulation, a null double)
//! are chosen when the process is composed.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

mod pull;

pub use pull::{drain_pull, PullSummary};

/// Opaque identity assigned by the runtime when a container is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendHandle(String);

impl BackendHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors surfaced by a container runtime adapter.
///
/// Display strings carry the runtime's own error text, since it is echoed
/// back to the orchestrator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("Container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("ImagePull failed for {image}: {reason}")]
    ImagePullFailed { image: String, reason: String },

    #[error("ContainerCreate failed: {0}")]
    CreateFailed(String),

    #[error("ContainerStart failed: {0}")]
    StartFailed(String),

    #[error("ContainerRemove failed: {0}")]
    RemoveFailed(String),

    #[error("ContainerLogs failed: {0}")]
    LogsFailed(String),

    #[error("No such container: {0}")]
    NotFound(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },
}

/// Observed state of a runtime object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeState {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Removing,
    Dead,
    Unknown,
}

impl RuntimeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeState::Created => "created",
            RuntimeState::Running => "running",
            RuntimeState::Paused => "paused",
            RuntimeState::Restarting => "restarting",
            RuntimeState::Exited => "exited",
            RuntimeState::Removing => "removing",
            RuntimeState::Dead => "dead",
            RuntimeState::Unknown => "unknown",
        }
    }
}

impl From<&str> for RuntimeState {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "created" => RuntimeState::Created,
            "running" => RuntimeState::Running,
            "paused" => RuntimeState::Paused,
            "restarting" => RuntimeState::Restarting,
            "exited" | "stopped" => RuntimeState::Exited,
            "removing" => RuntimeState::Removing,
            "dead" => RuntimeState::Dead,
            _ => RuntimeState::Unknown,
        }
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One runtime object as reported by a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSummary {
    pub handle: BackendHandle,
    /// Display name without any leading `/`.
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub state: RuntimeState,
    pub created_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i64>,
}

/// Label requirements an object must satisfy to be listed.
///
/// A requirement with no value only checks that the key is present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<(String, Option<String>)>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.push((key.into(), Some(value.into())));
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.requirements.push((key.into(), None));
        self
    }

    pub fn requirements(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.requirements
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.requirements().all(|(key, value)| match (labels.get(key), value) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }
}

/// Parameters for creating a runtime object.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateContainerOptions {
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
}

/// One progress report emitted while an image is pulled.
#[derive(Debug, Clone, PartialEq)]
pub struct PullProgress {
    pub status: String,
    pub layer: Option<String>,
    pub progress: Option<String>,
}

/// Lazily produced, finite pull progress. An `Err` item reports a failure;
/// the stream ends after the runtime stops reporting.
pub type PullStream = BoxStream<'static, Result<PullProgress, RuntimeError>>;

/// Raw container output. Ends when the container stops producing output or
/// the stream is dropped.
pub type LogStream = BoxStream<'static, Result<Bytes, RuntimeError>>;

/// Options for [`ContainerRuntime::stream_logs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    /// Keep the stream open and forward new output.
    pub follow: bool,
    /// Return only the last N lines of existing output.
    pub tail: Option<usize>,
    /// Prefix every line with the runtime's timestamp.
    pub timestamps: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            follow: true,
            tail: None,
            timestamps: false,
        }
    }
}

/// A container runtime the shim can drive.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Check that the runtime is reachable.
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// List every object, running or not, whose labels satisfy `selector`.
    async fn list_by_label(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<ContainerSummary>, RuntimeError>;

    /// Start pulling `image`. The returned stream must be drained with
    /// [`drain_pull`] before the image is used.
    async fn pull_image(&self, image: &str) -> Result<PullStream, RuntimeError>;

    async fn create(&self, options: &CreateContainerOptions) -> Result<BackendHandle, RuntimeError>;

    /// Returns once the runtime has accepted the start command.
    async fn start(&self, handle: &BackendHandle) -> Result<(), RuntimeError>;

    /// Remove an object; `force` also removes a running one.
    async fn remove(&self, handle: &BackendHandle, force: bool) -> Result<(), RuntimeError>;

    /// Open the output stream of an object. `reference` is either a handle
    /// or a container name the runtime can resolve.
    async fn stream_logs(
        &self,
        reference: &str,
        options: &LogOptions,
    ) -> Result<LogStream, RuntimeError>;
}
