//! Errors returned by pod lifecycle operations.

use container_runtime_interface::RuntimeError;
use shim_shared_types::PodKey;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The request is malformed or asks for something unsupported.
    #[error("{0}")]
    Validation(String),

    #[error("Pod not found: {0}")]
    NotFound(PodKey),

    #[error(transparent)]
    Backend(#[from] RuntimeError),
}

impl LifecycleError {
    pub fn validation(message: impl Into<String>) -> Self {
        LifecycleError::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
