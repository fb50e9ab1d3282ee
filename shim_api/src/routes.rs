//! Route table.
//!
//! Every response carries permissive CORS headers; `OPTIONS` on any route
//! is answered with those headers and nothing else.

use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::handlers;
use crate::state::ApiState;

const ALLOWED_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept";

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        // Node
        .route("/capacity", get(handlers::capacity).options(handlers::preflight))
        .route(
            "/nodeAddresses",
            get(handlers::node_addresses).options(handlers::preflight),
        )
        .route(
            "/nodeConditions",
            get(handlers::node_conditions).options(handlers::preflight),
        )
        // Pods
        .route("/getPods", get(handlers::get_pods).options(handlers::preflight))
        .route(
            "/getPodStatus",
            get(handlers::get_pod_status).options(handlers::preflight),
        )
        .route("/createPod", post(handlers::create_pod).options(handlers::preflight))
        .route("/deletePod", post(handlers::delete_pod).options(handlers::preflight))
        .route(
            "/getContainerLogs",
            get(handlers::get_container_logs).options(handlers::preflight),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
