//! Pod lifecycle orchestration.
//!
//! A create request moves through
//! `Received → Validated → ImagePulled → Created → Started → Registered`.
//! A failure at any step is returned immediately; earlier steps are not
//! rolled back, so a container that was created but failed to start stays
//! in the runtime and the pod is not registered.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use container_runtime_interface::{
    drain_pull, BackendHandle, ContainerRuntime, ContainerSummary, CreateContainerOptions,
    LogOptions, LogStream, RuntimeError,
};
use shim_shared_types::{ContainerSpec, Pod, PodKey, PodPhase, PodStatus, DEFAULT_NAMESPACE};

use crate::config::OrchestratorConfig;
use crate::error::{LifecycleError, Result};
use crate::identity;
use crate::record::PodRecord;
use crate::registry::PodRegistry;
use crate::status::StatusSynthesizer;

/// Drives a container runtime on behalf of the orchestrator's pod requests.
pub struct PodOrchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<PodRegistry>,
    synthesizer: StatusSynthesizer,
    config: OrchestratorConfig,
}

impl PodOrchestrator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: OrchestratorConfig) -> Self {
        Self::with_registry(runtime, Arc::new(PodRegistry::new()), config)
    }

    pub fn with_registry(
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<PodRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            runtime,
            registry,
            synthesizer: StatusSynthesizer::new(config.status_policy),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<PodRegistry> {
        &self.registry
    }

    pub fn runtime_name(&self) -> &'static str {
        self.runtime.name()
    }

    /// Check a pod can be run here and return its key and only container.
    ///
    /// An empty namespace means the default namespace.
    pub fn validate(pod: &Pod) -> Result<(PodKey, ContainerSpec)> {
        if pod.metadata.name.trim().is_empty() {
            return Err(LifecycleError::validation("Pod name is required"));
        }
        if pod.spec.containers.len() != 1 {
            return Err(LifecycleError::validation(format!(
                "CreatePod currently only supports a single container per pod, got {}",
                pod.spec.containers.len()
            )));
        }

        let container = pod.spec.containers[0].clone();
        if container.name.trim().is_empty() {
            return Err(LifecycleError::validation("Container name is required"));
        }
        if container.image.trim().is_empty() {
            return Err(LifecycleError::validation("Container image is required"));
        }

        Ok((normalized_key(&pod.metadata.namespace, &pod.metadata.name), container))
    }

    /// Run a pod. Returns once the runtime has accepted the start command.
    pub async fn create_pod(&self, pod: Pod) -> Result<PodStatus> {
        let (key, container) = Self::validate(&pod)?;
        info!(pod = %key, image = %container.image, "Creating pod");

        let mut record = PodRecord::pending(key.clone(), &pod, Utc::now());
        let container_name = identity::derive_name(&key.namespace, &key.name, &container.name);

        let stream = with_deadline(
            "ImagePull",
            self.config.backend_timeout,
            self.runtime.pull_image(&container.image),
        )
        .await?;
        let pulled = with_deadline(
            "ImagePull",
            self.config.pull_timeout,
            drain_pull(&container.image, stream),
        )
        .await?;
        info!(pod = %key, image = %container.image, events = pulled.events, "Pulled image");

        // A replaced pod's container holds the derived name. Once it is gone
        // the old record goes too, whether or not the new container starts.
        if let Some(previous) = self.registry.get(&key).await {
            if let Some(handle) = previous.backend_handle {
                info!(pod = %key, %handle, "Removing container of replaced pod");
                self.remove_container(&handle).await?;
                self.registry.delete_if_handle(&key, &handle).await;
            }
        }

        record.transition(PodPhase::Creating, "Creating");
        let options = CreateContainerOptions {
            name: container_name.clone(),
            image: container.image.clone(),
            labels: identity::labels_for(&key.namespace, &key.name, &container.name),
        };
        let handle = with_deadline(
            "ContainerCreate",
            self.config.backend_timeout,
            self.runtime.create(&options),
        )
        .await?;
        info!(pod = %key, container = %container_name, %handle, "Created container");
        record.backend_handle = Some(handle.clone());

        record.transition(PodPhase::Starting, "Starting");
        if let Err(err) = with_deadline(
            "ContainerStart",
            self.config.backend_timeout,
            self.runtime.start(&handle),
        )
        .await
        {
            error!(pod = %key, %handle, error = %err, "Container created but not started, leaving it in place");
            return Err(err.into());
        }
        info!(pod = %key, %handle, "Started container");

        let status = self.synthesizer.started(&container, &handle, Utc::now());
        record.apply_status(status.clone());
        if self.registry.put(record).await.is_some() {
            debug!(pod = %key, "Replaced existing pod record");
        }
        Ok(status)
    }

    /// Force-remove a registered pod's container and forget the pod.
    pub async fn delete_pod(&self, key: &PodKey) -> Result<()> {
        let key = normalized_key(&key.namespace, &key.name);
        let record = self
            .registry
            .get(&key)
            .await
            .ok_or_else(|| LifecycleError::NotFound(key.clone()))?;
        info!(pod = %key, "Deleting pod");

        match record.backend_handle {
            Some(handle) => {
                self.remove_container(&handle).await?;
                if !self.registry.delete_if_handle(&key, &handle).await {
                    debug!(pod = %key, "Pod was replaced while being deleted");
                }
            }
            None => {
                self.registry.delete(&key).await;
            }
        }
        Ok(())
    }

    /// Current status of a registered pod, refreshed from the runtime.
    pub async fn pod_status(&self, key: &PodKey) -> Result<PodStatus> {
        let key = normalized_key(&key.namespace, &key.name);
        let record = self
            .registry
            .get(&key)
            .await
            .ok_or_else(|| LifecycleError::NotFound(key.clone()))?;

        let listed = with_deadline(
            "ContainerList",
            self.config.backend_timeout,
            self.runtime.list_by_label(&identity::pod_selector(&key)),
        )
        .await?;

        Ok(self.refresh(&record, &listed).await)
    }

    /// Every registered pod with freshly synthesized status, sorted by key.
    pub async fn list_pods(&self) -> Result<Vec<Pod>> {
        let listed = with_deadline(
            "ContainerList",
            self.config.backend_timeout,
            self.runtime.list_by_label(&identity::managed_selector()),
        )
        .await?;

        let mut records = self.registry.list().await;
        records.sort_by(|a, b| a.key.cmp(&b.key));

        let mut pods = Vec::with_capacity(records.len());
        for mut record in records {
            let status = self.refresh(&record, &listed).await;
            record.apply_status(status);
            pods.push(record.to_pod());
        }
        Ok(pods)
    }

    /// Open the output stream of a pod's container.
    ///
    /// Unregistered pods are looked up in the runtime by derived name.
    pub async fn container_logs(
        &self,
        key: &PodKey,
        container_name: &str,
        options: &LogOptions,
    ) -> Result<LogStream> {
        let key = normalized_key(&key.namespace, &key.name);
        let reference = match self.registry.get(&key).await {
            Some(record) if record.container(container_name).is_some() => record
                .backend_handle
                .map(|handle| handle.to_string())
                .unwrap_or_else(|| identity::derive_name(&key.namespace, &key.name, container_name)),
            _ => identity::derive_name(&key.namespace, &key.name, container_name),
        };
        debug!(pod = %key, container = container_name, %reference, "Opening log stream");

        let stream = with_deadline(
            "ContainerLogs",
            self.config.backend_timeout,
            self.runtime.stream_logs(&reference, options),
        )
        .await?;
        Ok(stream)
    }

    /// Register managed containers that the registry does not know about,
    /// e.g. after a restart of the shim. Returns how many were adopted.
    pub async fn adopt_existing(&self) -> Result<usize> {
        let listed = with_deadline(
            "ContainerList",
            self.config.backend_timeout,
            self.runtime.list_by_label(&identity::managed_selector()),
        )
        .await?;

        let now = Utc::now();
        let mut adopted = 0;
        for summary in listed {
            let Some(key) = identity::pod_key_from_labels(&summary.labels) else {
                warn!(container = %summary.name, "Managed container without pod labels, skipping");
                continue;
            };
            if self.registry.contains(&key).await {
                continue;
            }

            let container = ContainerSpec {
                name: identity::container_name_from_labels(&summary.labels)
                    .unwrap_or(&summary.name)
                    .to_string(),
                image: summary.image.clone(),
            };
            let status = self.synthesizer.synthesize(&summary, Some(&container), now);
            let mut record = PodRecord::adopted(
                key.clone(),
                container,
                summary.handle.clone(),
                summary.created_at.unwrap_or(now),
            );
            record.apply_status(status);

            info!(pod = %key, handle = %summary.handle, phase = %record.phase, "Adopted existing container");
            self.registry.put(record).await;
            adopted += 1;
        }
        Ok(adopted)
    }

    /// Synthesize the status of `record` from a listing and store it.
    async fn refresh(&self, record: &PodRecord, listed: &[ContainerSummary]) -> PodStatus {
        let now = Utc::now();
        let Some(handle) = record.backend_handle.as_ref() else {
            return record.status();
        };

        let status = match listed.iter().find(|s| &s.handle == handle) {
            Some(summary) => {
                self.synthesizer
                    .synthesize(summary, record.containers.first(), now)
            }
            None => {
                warn!(pod = %record.key, %handle, "Registered pod has no container in the runtime");
                self.synthesizer.missing(record, now)
            }
        };

        self.registry.refresh(&record.key, handle, status.clone()).await;
        status
    }

    /// Force-remove a container; one that is already gone counts as removed.
    async fn remove_container(&self, handle: &BackendHandle) -> Result<()> {
        match with_deadline(
            "ContainerRemove",
            self.config.backend_timeout,
            self.runtime.remove(handle, true),
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(RuntimeError::NotFound(_)) => {
                warn!(%handle, "Container already gone from the runtime");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn normalized_key(namespace: &str, name: &str) -> PodKey {
    let namespace = if namespace.trim().is_empty() {
        DEFAULT_NAMESPACE
    } else {
        namespace
    };
    PodKey::new(namespace, name)
}

async fn with_deadline<T, F>(operation: &str, limit: Duration, call: F) -> std::result::Result<T, RuntimeError>
where
    F: Future<Output = std::result::Result<T, RuntimeError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RuntimeError::Timeout {
            operation: operation.to_string(),
            after: limit,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use bytes::Bytes;
    use container_runtime::{InMemoryRuntime, Operation, RuntimeState};
    use container_runtime_interface::{LabelSelector, PullStream};
    use futures_util::StreamExt;
    use shim_shared_types::{ObjectMeta, PodSpec};

    fn pod(namespace: &str, name: &str, containers: &[(&str, &str)]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                namespace: namespace.to_string(),
                name: name.to_string(),
                ..Default::default()
            },
            spec: PodSpec {
                containers: containers
                    .iter()
                    .map(|(name, image)| ContainerSpec {
                        name: name.to_string(),
                        image: image.to_string(),
                    })
                    .collect(),
            },
            status: PodStatus::default(),
        }
    }

    fn setup() -> (Arc<InMemoryRuntime>, PodOrchestrator) {
        let runtime = Arc::new(InMemoryRuntime::new());
        let orchestrator = PodOrchestrator::new(runtime.clone(), OrchestratorConfig::default());
        (runtime, orchestrator)
    }

    #[tokio::test]
    async fn test_create_then_status_is_running() {
        let (_runtime, orchestrator) = setup();
        orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx:latest")]))
            .await
            .unwrap();

        let status = orchestrator
            .pod_status(&PodKey::new("default", "web"))
            .await
            .unwrap();
        assert_eq!(status.phase, PodPhase::Running);
        assert_eq!(status.container_statuses.len(), 1);
        let container = &status.container_statuses[0];
        assert_eq!(container.name, "c1");
        assert_eq!(container.image, "nginx:latest");
        assert!(container.ready);
        assert_eq!(container.restart_count, 0);
    }

    #[tokio::test]
    async fn test_create_labels_and_names_container() {
        let (runtime, orchestrator) = setup();
        orchestrator
            .create_pod(pod("team_a", "web", &[("c1", "nginx")]))
            .await
            .unwrap();

        let summaries = runtime.summaries().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, identity::derive_name("team_a", "web", "c1"));
        assert_eq!(
            identity::pod_key_from_labels(&summaries[0].labels),
            Some(PodKey::new("team_a", "web"))
        );
        assert_eq!(summaries[0].state, RuntimeState::Running);
    }

    #[tokio::test]
    async fn test_rejects_pods_without_exactly_one_container() {
        let (runtime, orchestrator) = setup();

        for containers in [vec![], vec![("a", "nginx"), ("b", "redis")]] {
            let err = orchestrator
                .create_pod(pod("default", "multi", &containers))
                .await
                .unwrap_err();
            assert!(matches!(err, LifecycleError::Validation(_)));
        }

        assert_eq!(runtime.container_count().await, 0);
        assert!(!runtime.has_image("nginx").await);
        assert!(orchestrator.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_rejects_missing_names_and_images() {
        let (_runtime, orchestrator) = setup();
        for bad in [
            pod("default", "", &[("c1", "nginx")]),
            pod("default", "web", &[("", "nginx")]),
            pod("default", "web", &[("c1", " ")]),
        ] {
            let err = orchestrator.create_pod(bad).await.unwrap_err();
            assert!(matches!(err, LifecycleError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_empty_namespace_means_default() {
        let (_runtime, orchestrator) = setup();
        orchestrator
            .create_pod(pod("", "web", &[("c1", "nginx")]))
            .await
            .unwrap();

        assert!(orchestrator
            .registry()
            .contains(&PodKey::new(DEFAULT_NAMESPACE, "web"))
            .await);
        assert!(orchestrator.pod_status(&PodKey::new("", "web")).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_then_status_not_found() {
        let (runtime, orchestrator) = setup();
        let key = PodKey::new("default", "web");
        orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx:latest")]))
            .await
            .unwrap();

        orchestrator.delete_pod(&key).await.unwrap();
        assert_eq!(runtime.container_count().await, 0);
        assert!(matches!(
            orchestrator.pod_status(&key).await,
            Err(LifecycleError::NotFound(k)) if k == key
        ));
    }

    #[tokio::test]
    async fn test_delete_unknown_pod_has_no_side_effects() {
        let (runtime, orchestrator) = setup();
        orchestrator
            .create_pod(pod("default", "keep", &[("c1", "nginx")]))
            .await
            .unwrap();

        let err = orchestrator
            .delete_pod(&PodKey::new("default", "ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
        assert_eq!(runtime.container_count().await, 1);
        assert_eq!(orchestrator.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_list_returns_unique_pods_and_replaces_on_recreate() {
        let (runtime, orchestrator) = setup();
        for name in ["a", "b", "c"] {
            orchestrator
                .create_pod(pod("default", name, &[("c1", "nginx:1")]))
                .await
                .unwrap();
        }
        orchestrator
            .create_pod(pod("default", "b", &[("c1", "nginx:2")]))
            .await
            .unwrap();

        let pods = orchestrator.list_pods().await.unwrap();
        let names: Vec<_> = pods.iter().map(|p| p.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(pods[1].spec.containers[0].image, "nginx:2");
        assert_eq!(pods[1].status.container_statuses[0].image, "nginx:2");
        assert!(pods.iter().all(|p| p.status.phase == PodPhase::Running));
        assert_eq!(runtime.container_count().await, 3);
    }

    #[tokio::test]
    async fn test_pull_failure_creates_nothing() {
        let (runtime, orchestrator) = setup();
        runtime.reject_image("private/app:1", "pull access denied").await;

        let err = orchestrator
            .create_pod(pod("default", "web", &[("c1", "private/app:1")]))
            .await
            .unwrap_err();
        match err {
            LifecycleError::Backend(RuntimeError::ImagePullFailed { reason, .. }) => {
                assert_eq!(reason, "pull access denied")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(runtime.container_count().await, 0);
        assert!(orchestrator.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_create_failure_registers_nothing() {
        let (runtime, orchestrator) = setup();
        runtime.fail_next(Operation::Create, "disk full");

        let err = orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Backend(RuntimeError::CreateFailed(_))));
        assert_eq!(runtime.container_count().await, 0);
        assert!(orchestrator.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_replacement_forgets_removed_pod() {
        let (runtime, orchestrator) = setup();
        let key = PodKey::new("default", "web");
        orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx:1")]))
            .await
            .unwrap();

        runtime.fail_next(Operation::Create, "disk full");
        let err = orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx:2")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Backend(RuntimeError::CreateFailed(_))));

        assert_eq!(runtime.container_count().await, 0);
        assert!(!orchestrator.registry().contains(&key).await);
        assert!(matches!(
            orchestrator.pod_status(&key).await,
            Err(LifecycleError::NotFound(_))
        ));

        orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx:2")]))
            .await
            .unwrap();
        assert_eq!(
            orchestrator.pod_status(&key).await.unwrap().phase,
            PodPhase::Running
        );
    }

    #[tokio::test]
    async fn test_failed_replacement_start_keeps_only_new_orphan() {
        let (runtime, orchestrator) = setup();
        let key = PodKey::new("default", "web");
        orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx:1")]))
            .await
            .unwrap();

        runtime.fail_next(Operation::Start, "exec format error");
        assert!(orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx:2")]))
            .await
            .is_err());

        let summaries = runtime.summaries().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].image, "nginx:2");
        assert_eq!(summaries[0].state, RuntimeState::Created);
        assert!(!orchestrator.registry().contains(&key).await);
    }

    #[tokio::test]
    async fn test_start_failure_leaves_orphan_and_no_record() {
        let (runtime, orchestrator) = setup();
        runtime.fail_next(Operation::Start, "exec format error");

        let err = orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx")]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ContainerStart failed: exec format error");

        let summaries = runtime.summaries().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].state, RuntimeState::Created);
        assert!(orchestrator.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_listing_failure_is_backend_error() {
        let (runtime, orchestrator) = setup();
        orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx")]))
            .await
            .unwrap();

        runtime.fail_next(Operation::List, "daemon gone");
        assert!(matches!(
            orchestrator.list_pods().await,
            Err(LifecycleError::Backend(RuntimeError::Unavailable(_)))
        ));
        runtime.fail_next(Operation::List, "daemon gone");
        assert!(matches!(
            orchestrator.pod_status(&PodKey::new("default", "web")).await,
            Err(LifecycleError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_failure_keeps_record() {
        let (runtime, orchestrator) = setup();
        let key = PodKey::new("default", "web");
        orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx")]))
            .await
            .unwrap();

        runtime.fail_next(Operation::Remove, "device busy");
        let err = orchestrator.delete_pod(&key).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Backend(RuntimeError::RemoveFailed(_))));
        assert!(orchestrator.registry().contains(&key).await);
    }

    #[tokio::test]
    async fn test_vanished_container_reports_unknown_and_deletes_cleanly() {
        let (runtime, orchestrator) = setup();
        let key = PodKey::new("default", "web");
        orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx")]))
            .await
            .unwrap();

        let handle = orchestrator
            .registry()
            .get(&key)
            .await
            .unwrap()
            .backend_handle
            .unwrap();
        assert!(runtime.evict(&handle).await);

        let status = orchestrator.pod_status(&key).await.unwrap();
        assert_eq!(status.phase, PodPhase::Unknown);
        assert!(!status.container_statuses[0].ready);

        orchestrator.delete_pod(&key).await.unwrap();
        assert!(!orchestrator.registry().contains(&key).await);
    }

    #[tokio::test]
    async fn test_exited_container_reported_failed() {
        let (runtime, orchestrator) = setup();
        let key = PodKey::new("default", "job");
        orchestrator
            .create_pod(pod("default", "job", &[("main", "busybox")]))
            .await
            .unwrap();
        let handle = orchestrator.registry().get(&key).await.unwrap().backend_handle.unwrap();

        runtime.exit(handle.as_str(), 2).await.unwrap();
        let status = orchestrator.pod_status(&key).await.unwrap();
        assert_eq!(status.phase, PodPhase::Failed);
        assert_eq!(orchestrator.registry().get(&key).await.unwrap().phase, PodPhase::Failed);
    }

    #[tokio::test]
    async fn test_adopt_existing_containers() {
        let (runtime, orchestrator) = setup();
        let options = CreateContainerOptions {
            name: identity::derive_name("default", "legacy", "c1"),
            image: "redis:7".to_string(),
            labels: identity::labels_for("default", "legacy", "c1"),
        };
        runtime.insert_external(&options, RuntimeState::Running).await;
        runtime
            .insert_external(
                &CreateContainerOptions {
                    name: "unrelated".to_string(),
                    image: "redis:7".to_string(),
                    labels: Default::default(),
                },
                RuntimeState::Running,
            )
            .await;

        assert_eq!(orchestrator.adopt_existing().await.unwrap(), 1);
        assert_eq!(orchestrator.adopt_existing().await.unwrap(), 0);

        let status = orchestrator
            .pod_status(&PodKey::new("default", "legacy"))
            .await
            .unwrap();
        assert_eq!(status.phase, PodPhase::Running);
        assert_eq!(status.container_statuses[0].name, "c1");
        assert_eq!(status.container_statuses[0].image, "redis:7");
    }

    #[tokio::test]
    async fn test_logs_of_registered_pod() {
        let (runtime, orchestrator) = setup();
        let key = PodKey::new("default", "web");
        orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx")]))
            .await
            .unwrap();
        runtime
            .write_log(&identity::derive_name("default", "web", "c1"), "GET / 200")
            .await
            .unwrap();

        let options = LogOptions {
            follow: false,
            ..Default::default()
        };
        let chunks: Vec<Bytes> = orchestrator
            .container_logs(&key, "c1", &options)
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.last().unwrap(), &Bytes::from("GET / 200\n"));
    }

    #[tokio::test]
    async fn test_logs_of_unknown_container_is_backend_error() {
        let (_runtime, orchestrator) = setup();
        let result = orchestrator
            .container_logs(&PodKey::new("default", "ghost"), "c1", &LogOptions::default())
            .await;
        assert!(matches!(
            result,
            Err(LifecycleError::Backend(RuntimeError::NotFound(_)))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_and_deletes() {
        let (runtime, orchestrator) = setup();
        let orchestrator = Arc::new(orchestrator);

        let mut tasks = Vec::new();
        for i in 0..40 {
            let orchestrator = Arc::clone(&orchestrator);
            tasks.push(tokio::spawn(async move {
                let name = format!("pod-{i}");
                orchestrator
                    .create_pod(pod("default", &name, &[("c1", "busybox")]))
                    .await
                    .unwrap();
                if i % 4 == 0 {
                    orchestrator
                        .delete_pod(&PodKey::new("default", name))
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let pods = orchestrator.list_pods().await.unwrap();
        assert_eq!(pods.len(), 30);
        assert_eq!(runtime.container_count().await, 30);
    }

    #[tokio::test]
    async fn test_runtime_that_tracks_nothing_reports_missing_container() {
        let orchestrator =
            PodOrchestrator::new(Arc::new(container_runtime::NullRuntime), OrchestratorConfig::default());
        let key = PodKey::new("default", "web");
        orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx")]))
            .await
            .unwrap();

        let status = orchestrator.pod_status(&key).await.unwrap();
        assert_eq!(status.phase, PodPhase::Unknown);
        assert_eq!(status.reason.as_deref(), Some(crate::status::REASON_CONTAINER_MISSING));
        orchestrator.delete_pod(&key).await.unwrap();
        assert!(orchestrator.registry().is_empty().await);
    }

    /// Runtime whose listing never answers.
    struct StalledRuntime;

    #[async_trait]
    impl ContainerRuntime for StalledRuntime {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn ping(&self) -> std::result::Result<(), RuntimeError> {
            Ok(())
        }

        async fn list_by_label(
            &self,
            _selector: &LabelSelector,
        ) -> std::result::Result<Vec<ContainerSummary>, RuntimeError> {
            std::future::pending().await
        }

        async fn pull_image(&self, _image: &str) -> std::result::Result<PullStream, RuntimeError> {
            Ok(futures_util::stream::pending().boxed())
        }

        async fn create(
            &self,
            _options: &CreateContainerOptions,
        ) -> std::result::Result<BackendHandle, RuntimeError> {
            Ok(BackendHandle::new("stalled"))
        }

        async fn start(&self, _handle: &BackendHandle) -> std::result::Result<(), RuntimeError> {
            Ok(())
        }

        async fn remove(&self, _handle: &BackendHandle, _force: bool) -> std::result::Result<(), RuntimeError> {
            Ok(())
        }

        async fn stream_logs(
            &self,
            _reference: &str,
            _options: &LogOptions,
        ) -> std::result::Result<LogStream, RuntimeError> {
            Ok(futures_util::stream::empty().boxed())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_calls_are_bounded() {
        let config = OrchestratorConfig {
            backend_timeout: Duration::from_secs(5),
            pull_timeout: Duration::from_secs(60),
            ..Default::default()
        };
        let orchestrator = PodOrchestrator::new(Arc::new(StalledRuntime), config);

        let err = orchestrator.list_pods().await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Backend(RuntimeError::Timeout { ref operation, after })
                if operation == "ContainerList" && after == Duration::from_secs(5)
        ));

        let err = orchestrator
            .create_pod(pod("default", "web", &[("c1", "nginx")]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Backend(RuntimeError::Timeout { ref operation, .. }) if operation == "ImagePull"
        ));
        assert!(orchestrator.registry().is_empty().await);
    }
}
