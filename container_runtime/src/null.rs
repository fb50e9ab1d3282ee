//! Runtime that accepts every command and remembers nothing.
//!
//! Useful where an orchestrator needs a runtime but the test only cares
//! about validation or the HTTP surface.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use uuid::Uuid;

use container_runtime_interface::{
    BackendHandle, ContainerRuntime, ContainerSummary, CreateContainerOptions, LabelSelector,
    LogOptions, LogStream, PullStream, RuntimeError,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct NullRuntime;

#[async_trait]
impl ContainerRuntime for NullRuntime {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn list_by_label(
        &self,
        _selector: &LabelSelector,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        Ok(Vec::new())
    }

    async fn pull_image(&self, _image: &str) -> Result<PullStream, RuntimeError> {
        Ok(stream::empty().boxed())
    }

    async fn create(&self, _options: &CreateContainerOptions) -> Result<BackendHandle, RuntimeError> {
        Ok(BackendHandle::new(format!("null-{}", Uuid::new_v4().simple())))
    }

    async fn start(&self, _handle: &BackendHandle) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn remove(&self, _handle: &BackendHandle, _force: bool) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn stream_logs(
        &self,
        _reference: &str,
        _options: &LogOptions,
    ) -> Result<LogStream, RuntimeError> {
        Ok(stream::empty().boxed())
    }
}
