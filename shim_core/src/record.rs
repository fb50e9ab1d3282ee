//! Pod records held by the registry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use container_runtime_interface::BackendHandle;
use shim_shared_types::{
    ContainerSpec, ContainerStatus, ObjectMeta, Pod, PodCondition, PodKey, PodPhase, PodSpec,
    PodStatus,
};

/// What the shim knows about one pod.
///
/// The runtime handle is an attribute of the record; the registry is
/// always keyed by [`PodKey`].
#[derive(Debug, Clone, PartialEq)]
pub struct PodRecord {
    pub key: PodKey,
    pub labels: BTreeMap<String, String>,
    pub containers: Vec<ContainerSpec>,
    pub phase: PodPhase,
    pub message: Option<String>,
    pub reason: Option<String>,
    pub conditions: Vec<PodCondition>,
    pub container_statuses: Vec<ContainerStatus>,
    pub backend_handle: Option<BackendHandle>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl PodRecord {
    /// A record for a freshly received pod, before any runtime work.
    pub fn pending(key: PodKey, pod: &Pod, now: DateTime<Utc>) -> Self {
        Self {
            key,
            labels: pod.metadata.labels.clone(),
            containers: pod.spec.containers.clone(),
            phase: PodPhase::Pending,
            message: None,
            reason: None,
            conditions: Vec::new(),
            container_statuses: Vec::new(),
            backend_handle: None,
            created_at: pod.metadata.creation_timestamp.unwrap_or(now),
            started_at: None,
        }
    }

    /// A record rebuilt from a container found in the runtime.
    pub fn adopted(
        key: PodKey,
        container: ContainerSpec,
        handle: BackendHandle,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            labels: BTreeMap::new(),
            containers: vec![container],
            phase: PodPhase::Unknown,
            message: None,
            reason: None,
            conditions: Vec::new(),
            container_statuses: Vec::new(),
            backend_handle: Some(handle),
            created_at,
            started_at: None,
        }
    }

    pub fn transition(&mut self, phase: PodPhase, message: &str) {
        debug!(pod = %self.key, from = %self.phase, to = %phase, "{}", message);
        self.phase = phase;
        self.message = Some(message.to_string());
    }

    pub fn apply_status(&mut self, status: PodStatus) {
        self.phase = status.phase;
        self.message = status.message;
        self.reason = status.reason;
        if status.start_time.is_some() {
            self.started_at = status.start_time;
        }
        self.conditions = status.conditions;
        self.container_statuses = status.container_statuses;
    }

    pub fn status(&self) -> PodStatus {
        PodStatus {
            phase: self.phase,
            message: self.message.clone(),
            reason: self.reason.clone(),
            start_time: self.started_at,
            conditions: self.conditions.clone(),
            container_statuses: self.container_statuses.clone(),
        }
    }

    pub fn container(&self, name: &str) -> Option<&ContainerSpec> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn to_pod(&self) -> Pod {
        Pod {
            metadata: ObjectMeta {
                namespace: self.key.namespace.clone(),
                name: self.key.name.clone(),
                labels: self.labels.clone(),
                creation_timestamp: Some(self.created_at),
            },
            spec: PodSpec {
                containers: self.containers.clone(),
            },
            status: self.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shim_shared_types::{ContainerState, DEFAULT_NAMESPACE};

    fn pod() -> Pod {
        Pod {
            metadata: ObjectMeta {
                namespace: DEFAULT_NAMESPACE.to_string(),
                name: "web".to_string(),
                labels: BTreeMap::from([("app".to_string(), "web".to_string())]),
                creation_timestamp: None,
            },
            spec: PodSpec {
                containers: vec![ContainerSpec {
                    name: "c1".to_string(),
                    image: "nginx:latest".to_string(),
                }],
            },
            status: PodStatus::default(),
        }
    }

    #[test]
    fn test_pending_record_from_pod() {
        let now = Utc::now();
        let record = PodRecord::pending(pod().key(), &pod(), now);
        assert_eq!(record.phase, PodPhase::Pending);
        assert_eq!(record.created_at, now);
        assert!(record.backend_handle.is_none());
        assert_eq!(record.container("c1").unwrap().image, "nginx:latest");
        assert!(record.container("c2").is_none());
    }

    #[test]
    fn test_apply_status_and_render_pod() {
        let now = Utc::now();
        let mut record = PodRecord::pending(pod().key(), &pod(), now);
        record.transition(PodPhase::Creating, "Creating");
        assert_eq!(record.message.as_deref(), Some("Creating"));

        record.apply_status(PodStatus {
            phase: PodPhase::Running,
            message: Some("Running".to_string()),
            reason: None,
            start_time: Some(now),
            conditions: Vec::new(),
            container_statuses: vec![ContainerStatus {
                name: "c1".to_string(),
                image: "nginx:latest".to_string(),
                ready: true,
                restart_count: 0,
                state: ContainerState::running(now),
                container_id: None,
            }],
        });

        let rendered = record.to_pod();
        assert_eq!(rendered.key(), record.key);
        assert_eq!(rendered.metadata.labels.get("app").map(String::as_str), Some("web"));
        assert_eq!(rendered.status.phase, PodPhase::Running);
        assert_eq!(rendered.status.start_time, Some(now));
        assert_eq!(rendered.status.container_statuses.len(), 1);
    }
}
