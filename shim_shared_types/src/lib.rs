//! Orchestrator-shaped wire types shared by every crate in the shim.
//!
//! The JSON shape of these types follows the orchestrator's node-agent
//! objects (camelCase fields, `type` keys, RFC3339 timestamps) so that a
//! polling orchestrator can decode them without any translation layer.
//! Unknown fields on incoming objects are ignored.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Namespace used when a pod arrives without one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Unique identity of a pod on this node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
}

impl PodKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// ============================================================================
// Pod
// ============================================================================

/// A pod as submitted by, and reported back to, the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

impl Pod {
    /// Registry key of this pod.
    pub fn key(&self) -> PodKey {
        PodKey::new(self.metadata.namespace.clone(), self.metadata.name.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(
        default,
        with = "time_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

/// The subset of a container spec the shim acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
}

// ============================================================================
// Pod status
// ============================================================================

/// Coarse lifecycle stage of a pod.
///
/// `Creating` and `Starting` only exist while a create request is in
/// flight; `Succeeded` and `Failed` are reported when the runtime says the
/// workload has exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    #[default]
    Pending,
    Creating,
    Starting,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Creating => "Creating",
            PodPhase::Starting => "Starting",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub phase: PodPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(
        default,
        with = "time_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conditions: Vec<PodCondition>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodConditionType {
    Initialized,
    Ready,
    PodScheduled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodCondition {
    #[serde(rename = "type")]
    pub condition_type: PodConditionType,
    pub status: ConditionStatus,
    #[serde(
        default,
        with = "time_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_probe_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "time_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub name: String,
    pub image: String,
    pub ready: bool,
    pub restart_count: i32,
    #[serde(default)]
    pub state: ContainerState,
    /// Runtime id of the backing container.
    #[serde(default, rename = "containerID", skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

/// Exactly one of the three members is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting: Option<ContainerStateWaiting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<ContainerStateRunning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminated: Option<ContainerStateTerminated>,
}

impl ContainerState {
    pub fn running(started_at: DateTime<Utc>) -> Self {
        Self {
            running: Some(ContainerStateRunning {
                started_at: Some(started_at),
            }),
            ..Default::default()
        }
    }

    pub fn waiting(reason: impl Into<String>, message: Option<String>) -> Self {
        Self {
            waiting: Some(ContainerStateWaiting {
                reason: Some(reason.into()),
                message,
            }),
            ..Default::default()
        }
    }

    pub fn terminated(
        exit_code: i32,
        reason: impl Into<String>,
        started_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            terminated: Some(ContainerStateTerminated {
                exit_code,
                reason: Some(reason.into()),
                started_at,
                finished_at: None,
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStateWaiting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStateRunning {
    #[serde(
        default,
        with = "time_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStateTerminated {
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(
        default,
        with = "time_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "time_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub finished_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Node
// ============================================================================

/// Static resource quantities reported for this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapacity {
    pub cpu: String,
    pub memory: String,
    pub pods: String,
}

impl Default for NodeCapacity {
    fn default() -> Self {
        Self {
            cpu: "20".to_string(),
            memory: "100Gi".to_string(),
            pods: "20".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeAddressType {
    #[serde(rename = "InternalIP")]
    InternalIp,
    #[serde(rename = "ExternalIP")]
    ExternalIp,
    Hostname,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub address_type: NodeAddressType,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    #[serde(
        default,
        with = "time_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_heartbeat_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "time_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// RFC3339 timestamps with whole-second precision, as the orchestrator
/// emits them.
mod time_format {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(s) if !s.is_empty() => DateTime::parse_from_rfc3339(&s)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pod_decodes_orchestrator_json() {
        let json = r#"{
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "namespace": "default",
                "name": "web",
                "uid": "0b8c",
                "creationTimestamp": "2024-05-01T10:00:00Z"
            },
            "spec": {
                "containers": [
                    {"name": "c1", "image": "nginx:latest", "ports": [{"containerPort": 80}]}
                ],
                "nodeName": "vk"
            },
            "status": {}
        }"#;

        let pod: Pod = serde_json::from_str(json).unwrap();
        assert_eq!(pod.key(), PodKey::new("default", "web"));
        assert_eq!(pod.spec.containers.len(), 1);
        assert_eq!(pod.spec.containers[0].image, "nginx:latest");
        assert_eq!(
            pod.metadata.creation_timestamp,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(pod.status.phase, PodPhase::Pending);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let started = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let status = PodStatus {
            phase: PodPhase::Running,
            message: Some("Running".to_string()),
            reason: None,
            start_time: Some(started),
            conditions: vec![PodCondition {
                condition_type: PodConditionType::PodScheduled,
                status: ConditionStatus::True,
                last_probe_time: None,
                last_transition_time: None,
                reason: None,
                message: None,
            }],
            container_statuses: vec![ContainerStatus {
                name: "c1".to_string(),
                image: "nginx:latest".to_string(),
                ready: true,
                restart_count: 0,
                state: ContainerState::running(started),
                container_id: Some("docker://abc".to_string()),
            }],
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["phase"], "Running");
        assert_eq!(value["startTime"], "2024-05-01T10:00:00Z");
        assert_eq!(value["conditions"][0]["type"], "PodScheduled");
        assert_eq!(value["conditions"][0]["status"], "True");
        assert_eq!(value["containerStatuses"][0]["restartCount"], 0);
        assert_eq!(value["containerStatuses"][0]["containerID"], "docker://abc");
        assert_eq!(
            value["containerStatuses"][0]["state"]["running"]["startedAt"],
            "2024-05-01T10:00:00Z"
        );
        assert!(value.get("reason").is_none());
    }

    #[test]
    fn test_node_types_shape() {
        let address = NodeAddress {
            address_type: NodeAddressType::InternalIp,
            address: "10.0.0.7".to_string(),
        };
        let value = serde_json::to_value(&address).unwrap();
        assert_eq!(value["type"], "InternalIP");

        let capacity = serde_json::to_value(NodeCapacity::default()).unwrap();
        assert_eq!(capacity["memory"], "100Gi");
        assert_eq!(capacity["pods"], "20");
    }

    #[test]
    fn test_condition_status_from_bool() {
        assert_eq!(ConditionStatus::from(true), ConditionStatus::True);
        assert_eq!(ConditionStatus::from(false), ConditionStatus::False);
    }
}
