//! API request handlers.

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use futures_util::StreamExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};

use container_runtime_interface::LogOptions;
use shim_shared_types::{Pod, PodKey};

use crate::error::{ApiError, ApiResult};
use crate::state::ApiState;

// ============================================================================
// Query Types
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodStatusQuery {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerLogsQuery {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub pod_name: String,
    #[serde(default)]
    pub container_name: String,
    pub follow: Option<bool>,
    pub tail: Option<usize>,
    pub timestamps: Option<bool>,
}

impl ContainerLogsQuery {
    fn log_options(&self) -> LogOptions {
        let defaults = LogOptions::default();
        LogOptions {
            follow: self.follow.unwrap_or(defaults.follow),
            tail: self.tail,
            timestamps: self.timestamps.unwrap_or(defaults.timestamps),
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|err| ApiError::bad_request(format!("Invalid request body: {err}")))
}

fn require(value: &str, what: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::validation_error(format!("{what} is required")));
    }
    Ok(())
}

// ============================================================================
// Node Handlers
// ============================================================================

pub async fn capacity(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.node.capacity().clone())
}

pub async fn node_addresses(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.node.addresses().to_vec())
}

pub async fn node_conditions(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.node.conditions(Utc::now()))
}

// ============================================================================
// Pod Handlers
// ============================================================================

/// List every pod on this node.
pub async fn get_pods(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let pods = state.orchestrator.list_pods().await?;
    Ok(Json(pods))
}

pub async fn get_pod_status(
    State(state): State<ApiState>,
    Query(query): Query<PodStatusQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&query.name, "name")?;
    let status = state
        .orchestrator
        .pod_status(&PodKey::new(query.namespace, query.name))
        .await?;
    Ok(Json(status))
}

/// Run a pod. Answers once the runtime has accepted the start.
pub async fn create_pod(State(state): State<ApiState>, body: Bytes) -> ApiResult<impl IntoResponse> {
    let pod: Pod = parse_body(&body)?;
    let key = pod.key();
    state.orchestrator.create_pod(pod).await?;
    info!(pod = %key, "Pod created");
    Ok(StatusCode::ACCEPTED)
}

pub async fn delete_pod(State(state): State<ApiState>, body: Bytes) -> ApiResult<impl IntoResponse> {
    let pod: Pod = parse_body(&body)?;
    require(&pod.metadata.name, "Pod name")?;
    let key = pod.key();
    state.orchestrator.delete_pod(&key).await?;
    info!(pod = %key, "Pod deleted");
    Ok(StatusCode::OK)
}

/// Stream a container's output. The runtime stream is dropped, and so
/// cancelled, when the client goes away.
pub async fn get_container_logs(
    State(state): State<ApiState>,
    Query(query): Query<ContainerLogsQuery>,
) -> ApiResult<Response> {
    require(&query.pod_name, "podName")?;
    require(&query.container_name, "containerName")?;

    let key = PodKey::new(query.namespace.clone(), query.pod_name.clone());
    let stream = state
        .orchestrator
        .container_logs(&key, &query.container_name, &query.log_options())
        .await?;

    let stream = stream.inspect(move |chunk| {
        if let Err(err) = chunk {
            warn!(pod = %key, error = %err, "Log stream ended with an error");
        }
    });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Answer a CORS preflight with headers only.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}
