//! Orchestrator configuration.

use std::time::Duration;

use crate::status::StatusPolicy;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline for each short runtime call (list, create, start, remove,
    /// opening a log stream).
    pub backend_timeout: Duration,
    /// Deadline for draining an image pull.
    pub pull_timeout: Duration,
    pub status_policy: StatusPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(30),
            pull_timeout: Duration::from_secs(600),
            status_policy: StatusPolicy::Observed,
        }
    }
}
