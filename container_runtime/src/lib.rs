//! Container runtime implementations for the node shim.
//!
//! This crate provides implementations of the `ContainerRuntime` trait:
//! - `InMemoryRuntime`: simulated runtime that keeps containers in memory (default)
//! - `NullRuntime`: accepts every command and tracks nothing
//! - `DockerRuntime`: live runtime talking to the Docker Engine API (requires `docker-runtime` feature)

pub mod null;

#[cfg(feature = "mock-runtime")]
pub mod mock;

#[cfg(feature = "docker-runtime")]
pub mod docker;

// Re-export common types
pub use container_runtime_interface::{
    BackendHandle, ContainerRuntime, ContainerSummary, CreateContainerOptions, LabelSelector,
    LogOptions, RuntimeError, RuntimeState,
};

pub use null::NullRuntime;

#[cfg(feature = "mock-runtime")]
pub use mock::{InMemoryRuntime, Operation};

#[cfg(feature = "docker-runtime")]
pub use docker::{DockerConfig, DockerRuntime};
