//! Pod lifecycle for the node-agent shim: identity mapping, the pod
//! registry, status synthesis and the orchestrator driving a container
//! runtime.

pub mod config;
pub mod error;
pub mod identity;
pub mod node;
pub mod orchestrator;
pub mod record;
pub mod registry;
pub mod status;

pub use config::OrchestratorConfig;
pub use error::{LifecycleError, Result};
pub use node::NodeInfo;
pub use orchestrator::PodOrchestrator;
pub use record::PodRecord;
pub use registry::PodRegistry;
pub use status::{StatusPolicy, StatusSynthesizer};
