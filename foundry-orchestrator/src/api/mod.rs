//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod daemon;
pub mod error;
pub mod health;
pub mod job;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::service::Server;

/// Create the main API router with all endpoints
pub fn create_router(server: Arc<Server>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Daemon RPC surface
        .route("/daemon/acquire", post(daemon::acquire_job))
        .route("/daemon/quota", post(daemon::commit_quota))
        .route("/daemon/update", post(daemon::update_job))
        .route("/daemon/fail", post(daemon::fail_job))
        .route("/daemon/complete", post(daemon::complete_job))
        // Job read endpoints
        .route("/job/{id}/logs", get(job::get_job_logs))
        .route("/job/{id}/resources", get(job::get_job_resources))
        // Add state and middleware
        .with_state(server)
        .layer(TraceLayer::new_for_http())
}
