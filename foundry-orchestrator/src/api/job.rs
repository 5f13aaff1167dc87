//! Job API Handlers
//!
//! Read-side endpoints: incremental log fetches (driven by the
//! `created_after` notify cursor) and materialized resources.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use foundry_core::domain::job::JobLog;
use foundry_core::domain::resource::WorkspaceResource;

use crate::api::error::ApiResult;
use crate::service::Server;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Fetch logs with ids strictly above this; defaults to the beginning.
    #[serde(default)]
    pub after: i64,
}

/// GET /job/{id}/logs
/// Logs for a job from a cursor onward.
pub async fn get_job_logs(
    State(server): State<Arc<Server>>,
    Path(id): Path<Uuid>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<Vec<JobLog>>> {
    tracing::debug!("fetching logs for job {} after {}", id, query.after);
    let logs = server.job_logs(id, query.after).await?;
    Ok(Json(logs))
}

/// GET /job/{id}/resources
/// Resources materialized by a job's completion.
pub async fn get_job_resources(
    State(server): State<Arc<Server>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<WorkspaceResource>>> {
    tracing::debug!("fetching resources for job {}", id);
    let resources = server.job_resources(id).await?;
    Ok(Json(resources))
}
