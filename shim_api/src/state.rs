//! API server state.

use std::sync::Arc;

use shim_core::{NodeInfo, PodOrchestrator};

/// Shared state for the API server.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<PodOrchestrator>,
    /// Static node report.
    pub node: Arc<NodeInfo>,
}

impl ApiState {
    pub fn new(orchestrator: PodOrchestrator, node: NodeInfo) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            node: Arc::new(node),
        }
    }
}
