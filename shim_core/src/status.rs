//! Synthesis of orchestrator-shaped pod status from runtime listings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use container_runtime_interface::{BackendHandle, ContainerSummary, RuntimeState};
use shim_shared_types::{
    ConditionStatus, ContainerSpec, ContainerState, ContainerStatus,
    PodCondition, PodConditionType, PodPhase, PodStatus,
};

use crate::identity;
use crate::record::PodRecord;

/// How runtime state is turned into pod status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusPolicy {
    /// The runtime's reported state decides phase and readiness.
    #[default]
    Observed,
    /// Every listed container is reported Running and Ready, whatever the
    /// runtime says.
    Fixed,
}

impl FromStr for StatusPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "observed" => Ok(StatusPolicy::Observed),
            "fixed" => Ok(StatusPolicy::Fixed),
            other => Err(format!(
                "unknown status policy '{other}', expected 'observed' or 'fixed'"
            )),
        }
    }
}

impl fmt::Display for StatusPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusPolicy::Observed => f.write_str("observed"),
            StatusPolicy::Fixed => f.write_str("fixed"),
        }
    }
}

pub const REASON_CONTAINER_MISSING: &str = "ContainerMissing";
pub const MESSAGE_CONTAINER_MISSING: &str = "backend container not found";

/// Pod status for one container, before the pod-level fields are filled.
struct Observation {
    phase: PodPhase,
    ready: bool,
    state: ContainerState,
    message: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusSynthesizer {
    policy: StatusPolicy,
}

impl StatusSynthesizer {
    pub fn new(policy: StatusPolicy) -> Self {
        Self { policy }
    }

    /// Status of a pod whose single container is `summary`.
    ///
    /// `spec` is the container as the pod asked for it, when known; the
    /// reported name and image come from it in preference to the runtime.
    pub fn synthesize(
        &self,
        summary: &ContainerSummary,
        spec: Option<&ContainerSpec>,
        now: DateTime<Utc>,
    ) -> PodStatus {
        let started_at = summary.created_at.unwrap_or(now);
        let observation = match self.policy {
            StatusPolicy::Fixed => Observation {
                phase: PodPhase::Running,
                ready: true,
                state: ContainerState::running(started_at),
                message: "Running".to_string(),
            },
            StatusPolicy::Observed => observe(summary, started_at),
        };

        let name = spec
            .map(|c| c.name.clone())
            .or_else(|| identity::container_name_from_labels(&summary.labels).map(str::to_string))
            .unwrap_or_else(|| summary.name.clone());
        let image = spec
            .map(|c| c.image.clone())
            .filter(|image| !image.is_empty())
            .unwrap_or_else(|| summary.image.clone());

        PodStatus {
            phase: observation.phase,
            message: Some(observation.message),
            reason: None,
            start_time: Some(started_at),
            conditions: conditions(observation.ready, now),
            container_statuses: vec![ContainerStatus {
                name,
                image,
                ready: observation.ready,
                restart_count: 0,
                state: observation.state,
                container_id: Some(summary.handle.to_string()),
            }],
        }
    }

    /// Status right after the runtime accepted the start command.
    pub fn started(&self, spec: &ContainerSpec, handle: &BackendHandle, now: DateTime<Utc>) -> PodStatus {
        PodStatus {
            phase: PodPhase::Running,
            message: Some("Running".to_string()),
            reason: None,
            start_time: Some(now),
            conditions: conditions(true, now),
            container_statuses: vec![ContainerStatus {
                name: spec.name.clone(),
                image: spec.image.clone(),
                ready: true,
                restart_count: 0,
                state: ContainerState::running(now),
                container_id: Some(handle.to_string()),
            }],
        }
    }

    /// Status of a registered pod whose runtime container is gone.
    pub fn missing(&self, record: &PodRecord, now: DateTime<Utc>) -> PodStatus {
        PodStatus {
            phase: PodPhase::Unknown,
            message: Some(MESSAGE_CONTAINER_MISSING.to_string()),
            reason: Some(REASON_CONTAINER_MISSING.to_string()),
            start_time: record.started_at,
            conditions: conditions(false, now),
            container_statuses: record
                .containers
                .iter()
                .map(|c| ContainerStatus {
                    name: c.name.clone(),
                    image: c.image.clone(),
                    ready: false,
                    restart_count: 0,
                    state: ContainerState::waiting(
                        REASON_CONTAINER_MISSING,
                        Some(MESSAGE_CONTAINER_MISSING.to_string()),
                    ),
                    container_id: record.backend_handle.as_ref().map(ToString::to_string),
                })
                .collect(),
        }
    }
}

fn observe(summary: &ContainerSummary, started_at: DateTime<Utc>) -> Observation {
    match summary.state {
        RuntimeState::Running => Observation {
            phase: PodPhase::Running,
            ready: true,
            state: ContainerState::running(started_at),
            message: "Running".to_string(),
        },
        RuntimeState::Created => Observation {
            phase: PodPhase::Pending,
            ready: false,
            state: ContainerState::waiting("ContainerCreating", None),
            message: "Created".to_string(),
        },
        RuntimeState::Restarting => Observation {
            phase: PodPhase::Running,
            ready: false,
            state: ContainerState::waiting("Restarting", None),
            message: "Restarting".to_string(),
        },
        RuntimeState::Paused => Observation {
            phase: PodPhase::Running,
            ready: false,
            state: ContainerState::running(started_at),
            message: "Paused".to_string(),
        },
        RuntimeState::Exited => {
            let exit_code = summary.exit_code.unwrap_or(0);
            let (phase, reason) = if exit_code == 0 {
                (PodPhase::Succeeded, "Completed")
            } else {
                (PodPhase::Failed, "Error")
            };
            Observation {
                phase,
                ready: false,
                state: ContainerState::terminated(
                    i32::try_from(exit_code).unwrap_or(i32::MAX),
                    reason,
                    Some(started_at),
                ),
                message: format!("Exited ({exit_code})"),
            }
        }
        RuntimeState::Removing | RuntimeState::Dead | RuntimeState::Unknown => Observation {
            phase: PodPhase::Unknown,
            ready: false,
            state: ContainerState::waiting(summary.state.as_str(), None),
            message: summary.state.to_string(),
        },
    }
}

fn conditions(ready: bool, now: DateTime<Utc>) -> Vec<PodCondition> {
    [
        (PodConditionType::Initialized, ConditionStatus::True),
        (PodConditionType::Ready, ConditionStatus::from(ready)),
        (PodConditionType::PodScheduled, ConditionStatus::True),
    ]
    .into_iter()
    .map(|(condition_type, status)| PodCondition {
        condition_type,
        status,
        last_probe_time: None,
        last_transition_time: Some(now),
        reason: None,
        message: None,
    })
    .collect()
}
