//! In-memory container runtime.
//!
//! Simulates the parts of a real runtime the shim depends on: images must
//! be pulled (and the pull drained) before a container can use them,
//! container names are unique, a running container cannot be removed
//! without `force`, and followed log streams end when the container exits
//! or is removed.
//!
//! Failures can be injected per operation with [`InMemoryRuntime::fail_next`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::stream::{self, StreamExt};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use container_runtime_interface::{
    BackendHandle, ContainerRuntime, ContainerSummary, CreateContainerOptions, LabelSelector,
    LogOptions, LogStream, PullProgress, PullStream, RuntimeError, RuntimeState,
};

const LOG_CHANNEL_CAPACITY: usize = 256;

/// Lines of output kept per container; older lines are dropped.
const LOG_BACKLOG_LINES: usize = 1000;

/// Runtime operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Pull,
    Create,
    Start,
    Remove,
    Logs,
}

type LogLine = (DateTime<Utc>, Bytes);

struct MockContainer {
    handle: BackendHandle,
    name: String,
    image: String,
    labels: HashMap<String, String>,
    state: RuntimeState,
    created_at: DateTime<Utc>,
    exit_code: Option<i64>,
    backlog: VecDeque<LogLine>,
    log_tx: broadcast::Sender<LogLine>,
}

impl MockContainer {
    fn summary(&self) -> ContainerSummary {
        ContainerSummary {
            handle: self.handle.clone(),
            name: self.name.clone(),
            image: self.image.clone(),
            labels: self.labels.clone(),
            state: self.state,
            created_at: Some(self.created_at),
            exit_code: self.exit_code,
        }
    }

    fn append_log(&mut self, line: impl Into<Bytes>) {
        let entry = (Utc::now(), line.into());
        if self.backlog.len() == LOG_BACKLOG_LINES {
            self.backlog.pop_front();
        }
        self.backlog.push_back(entry.clone());
        // No receivers is fine.
        let _ = self.log_tx.send(entry);
    }
}

/// Simulated runtime keeping all state in process memory.
#[derive(Clone, Default)]
pub struct InMemoryRuntime {
    containers: Arc<RwLock<HashMap<String, MockContainer>>>,
    images: Arc<RwLock<HashSet<String>>>,
    rejected_images: Arc<RwLock<HashMap<String, String>>>,
    failures: Arc<Mutex<HashMap<Operation, String>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `operation` fail with `reason`.
    pub fn fail_next(&self, operation: Operation, reason: impl Into<String>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(operation, reason.into());
        }
    }

    /// Simulate losing (or regaining) the connection to the runtime.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut flag) = self.unavailable.lock() {
            *flag = unavailable;
        }
    }

    /// Pulls of `image` report progress and then fail with `reason`.
    pub async fn reject_image(&self, image: &str, reason: impl Into<String>) {
        self.rejected_images
            .write()
            .await
            .insert(normalize_image(image), reason.into());
    }

    pub async fn has_image(&self, image: &str) -> bool {
        self.images.read().await.contains(&normalize_image(image))
    }

    pub async fn container_count(&self) -> usize {
        self.containers.read().await.len()
    }

    pub async fn summaries(&self) -> Vec<ContainerSummary> {
        self.containers
            .read()
            .await
            .values()
            .map(MockContainer::summary)
            .collect()
    }

    /// Append a line of output to a container.
    pub async fn write_log(&self, reference: &str, line: &str) -> Result<(), RuntimeError> {
        let mut containers = self.containers.write().await;
        let container = find_mut(&mut containers, reference)
            .ok_or_else(|| RuntimeError::NotFound(reference.to_string()))?;
        container.append_log(format!("{line}\n"));
        Ok(())
    }

    /// Simulate the workload exiting on its own. Followed log streams end.
    pub async fn exit(&self, reference: &str, exit_code: i64) -> Result<(), RuntimeError> {
        let mut containers = self.containers.write().await;
        let container = find_mut(&mut containers, reference)
            .ok_or_else(|| RuntimeError::NotFound(reference.to_string()))?;
        container.state = RuntimeState::Exited;
        container.exit_code = Some(exit_code);
        let (log_tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        container.log_tx = log_tx;
        Ok(())
    }

    /// Register a container that was created behind the shim's back.
    pub async fn insert_external(
        &self,
        options: &CreateContainerOptions,
        state: RuntimeState,
    ) -> BackendHandle {
        let handle = BackendHandle::new(Uuid::new_v4().simple().to_string());
        let (log_tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        let container = MockContainer {
            handle: handle.clone(),
            name: options.name.clone(),
            image: options.image.clone(),
            labels: options.labels.clone(),
            state,
            created_at: Utc::now(),
            exit_code: None,
            backlog: VecDeque::new(),
            log_tx,
        };
        self.containers
            .write()
            .await
            .insert(handle.as_str().to_string(), container);
        handle
    }

    /// Number of followed log streams currently attached to a container.
    pub async fn log_followers(&self, reference: &str) -> usize {
        let containers = self.containers.read().await;
        find(&containers, reference)
            .map(|c| c.log_tx.receiver_count())
            .unwrap_or(0)
    }

    /// Remove a container behind the shim's back.
    pub async fn evict(&self, handle: &BackendHandle) -> bool {
        self.containers.write().await.remove(handle.as_str()).is_some()
    }

    fn check(&self, operation: Operation) -> Result<(), String> {
        if self.unavailable.lock().map(|flag| *flag).unwrap_or(false) {
            return Err("Cannot connect to the in-memory runtime".to_string());
        }
        match self.failures.lock() {
            Ok(mut failures) => match failures.remove(&operation) {
                Some(reason) => Err(reason),
                None => Ok(()),
            },
            Err(_) => Ok(()),
        }
    }
}

fn find_mut<'a>(
    containers: &'a mut HashMap<String, MockContainer>,
    reference: &str,
) -> Option<&'a mut MockContainer> {
    if containers.contains_key(reference) {
        return containers.get_mut(reference);
    }
    containers.values_mut().find(|c| c.name == reference)
}

fn find<'a>(
    containers: &'a HashMap<String, MockContainer>,
    reference: &str,
) -> Option<&'a MockContainer> {
    containers
        .get(reference)
        .or_else(|| containers.values().find(|c| c.name == reference))
}

/// `nginx` and `nginx:latest` name the same image.
fn normalize_image(image: &str) -> String {
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    if image.contains('@') || last_segment.contains(':') {
        image.to_string()
    } else {
        format!("{image}:latest")
    }
}

fn progress(status: impl Into<String>, layer: Option<&str>) -> PullProgress {
    PullProgress {
        status: status.into(),
        layer: layer.map(str::to_string),
        progress: None,
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        if self.unavailable.lock().map(|flag| *flag).unwrap_or(false) {
            return Err(RuntimeError::Unavailable(
                "Cannot connect to the in-memory runtime".to_string(),
            ));
        }
        Ok(())
    }

    async fn list_by_label(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        self.check(Operation::List).map_err(RuntimeError::Unavailable)?;

        let containers = self.containers.read().await;
        let mut listed: Vec<ContainerSummary> = containers
            .values()
            .filter(|c| selector.matches(&c.labels))
            .map(MockContainer::summary)
            .collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }

    async fn pull_image(&self, image: &str) -> Result<PullStream, RuntimeError> {
        self.check(Operation::Pull)
            .map_err(|reason| RuntimeError::ImagePullFailed {
                image: image.to_string(),
                reason,
            })?;

        let reference = normalize_image(image);
        let repository = reference
            .rsplit_once(':')
            .map(|(repo, _)| repo.to_string())
            .unwrap_or_else(|| reference.clone());
        let layer = format!("{:.12}", Uuid::new_v4().simple().to_string());

        let head = stream::iter(vec![
            Ok(progress(format!("Pulling from {repository}"), None)),
            Ok(progress("Pulling fs layer", Some(&layer))),
            Ok(progress("Download complete", Some(&layer))),
        ]);

        if let Some(reason) = self.rejected_images.read().await.get(&reference).cloned() {
            let failure = stream::once(async move {
                Err(RuntimeError::ImagePullFailed {
                    image: reference,
                    reason,
                })
            });
            return Ok(head.chain(failure).boxed());
        }

        // The image only becomes usable once the stream has been drained.
        let images = Arc::clone(&self.images);
        let tail = stream::once(async move {
            images.write().await.insert(reference.clone());
            Ok(progress(
                format!("Status: Downloaded newer image for {reference}"),
                None,
            ))
        });
        Ok(head.chain(tail).boxed())
    }

    async fn create(&self, options: &CreateContainerOptions) -> Result<BackendHandle, RuntimeError> {
        self.check(Operation::Create).map_err(RuntimeError::CreateFailed)?;

        if !self.has_image(&options.image).await {
            return Err(RuntimeError::CreateFailed(format!(
                "No such image: {}",
                options.image
            )));
        }

        let mut containers = self.containers.write().await;
        if let Some(existing) = containers.values().find(|c| c.name == options.name) {
            return Err(RuntimeError::CreateFailed(format!(
                "Conflict. The container name \"/{}\" is already in use by container \"{}\"",
                options.name, existing.handle
            )));
        }

        let handle = BackendHandle::new(Uuid::new_v4().simple().to_string());
        let (log_tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        containers.insert(
            handle.as_str().to_string(),
            MockContainer {
                handle: handle.clone(),
                name: options.name.clone(),
                image: options.image.clone(),
                labels: options.labels.clone(),
                state: RuntimeState::Created,
                created_at: Utc::now(),
                exit_code: None,
                backlog: VecDeque::new(),
                log_tx,
            },
        );

        info!("InMemoryRuntime: Created container {} ({})", options.name, handle);
        Ok(handle)
    }

    async fn start(&self, handle: &BackendHandle) -> Result<(), RuntimeError> {
        self.check(Operation::Start).map_err(RuntimeError::StartFailed)?;

        let mut containers = self.containers.write().await;
        let container = find_mut(&mut containers, handle.as_str()).ok_or_else(|| {
            RuntimeError::StartFailed(format!("No such container: {handle}"))
        })?;

        if container.state != RuntimeState::Running {
            container.state = RuntimeState::Running;
            container.exit_code = None;
            let line = format!("{} started from {}\n", container.name, container.image);
            container.append_log(line);
        }

        info!("InMemoryRuntime: Started container {}", handle);
        Ok(())
    }

    async fn remove(&self, handle: &BackendHandle, force: bool) -> Result<(), RuntimeError> {
        self.check(Operation::Remove).map_err(RuntimeError::RemoveFailed)?;

        let mut containers = self.containers.write().await;
        let key = match find(&containers, handle.as_str()) {
            Some(container) => {
                if container.state == RuntimeState::Running && !force {
                    return Err(RuntimeError::RemoveFailed(format!(
                        "You cannot remove a running container {handle}. Stop the container before attempting removal or force remove"
                    )));
                }
                container.handle.as_str().to_string()
            }
            None => return Err(RuntimeError::NotFound(handle.to_string())),
        };

        // Dropping the sender ends every followed log stream.
        containers.remove(&key);
        info!("InMemoryRuntime: Removed container {}", handle);
        Ok(())
    }

    async fn stream_logs(
        &self,
        reference: &str,
        options: &LogOptions,
    ) -> Result<LogStream, RuntimeError> {
        self.check(Operation::Logs).map_err(RuntimeError::LogsFailed)?;

        let containers = self.containers.read().await;
        let container =
            find(&containers, reference).ok_or_else(|| RuntimeError::NotFound(reference.to_string()))?;

        let skip = options
            .tail
            .map(|n| container.backlog.len().saturating_sub(n))
            .unwrap_or(0);
        let backlog: Vec<LogLine> = container.backlog.iter().skip(skip).cloned().collect();
        let receiver = (options.follow && container.state == RuntimeState::Running)
            .then(|| container.log_tx.subscribe());
        drop(containers);

        debug!(
            "InMemoryRuntime: Streaming logs of {} ({} buffered lines, follow={})",
            reference,
            backlog.len(),
            receiver.is_some()
        );

        let timestamps = options.timestamps;
        let render = move |(at, line): LogLine| -> Result<Bytes, RuntimeError> {
            if timestamps {
                let mut out = at.to_rfc3339_opts(SecondsFormat::Nanos, true).into_bytes();
                out.push(b' ');
                out.extend_from_slice(&line);
                Ok(Bytes::from(out))
            } else {
                Ok(line)
            }
        };

        let buffered = stream::iter(backlog).map(render);
        let Some(receiver) = receiver else {
            return Ok(buffered.boxed());
        };

        let live = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(entry) => return Some((entry, receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .map(render);

        Ok(buffered.chain(live).boxed())
    }
}
