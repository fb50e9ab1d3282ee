// Virtual node HTTP shim
//
// Serves the node-agent endpoints an orchestrator polls and commands, and
// runs the pods it is sent on a container runtime.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;

pub use config::ShimConfig;
pub use routes::create_router;
pub use server::ApiServer;
pub use state::ApiState;
