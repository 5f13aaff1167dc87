//! Daemon API Handlers
//!
//! The RPC surface provisioner daemons call: acquire, quota, update, fail,
//! and complete. Wire framing is JSON over HTTP; job ids ride in request
//! bodies and are parsed by the engine.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};

use foundry_core::dto::job::{
    AcquiredJob, CommitQuotaRequest, CommitQuotaResponse, CompletedJob, FailedJob,
    UpdateJobRequest, UpdateJobResponse,
};

use crate::api::error::ApiResult;
use crate::service::Server;

/// POST /daemon/acquire
/// Hand the calling daemon a job, or the empty envelope when none is
/// available.
pub async fn acquire_job(State(server): State<Arc<Server>>) -> ApiResult<Json<AcquiredJob>> {
    let job = server.acquire_job().await?;
    if !job.is_empty() {
        tracing::info!("acquired job {} for daemon", job.job_id);
    }
    Ok(Json(job))
}

/// POST /daemon/quota
/// Commit quota usage for an owned job.
pub async fn commit_quota(
    State(server): State<Arc<Server>>,
    Json(request): Json<CommitQuotaRequest>,
) -> ApiResult<Json<CommitQuotaResponse>> {
    tracing::debug!("quota commit for job {}", request.job_id);
    let response = server.commit_quota(request).await?;
    Ok(Json(response))
}

/// POST /daemon/update
/// Apply a progress report to an owned job.
pub async fn update_job(
    State(server): State<Arc<Server>>,
    Json(request): Json<UpdateJobRequest>,
) -> ApiResult<Json<UpdateJobResponse>> {
    let response = server.update_job(request).await?;
    Ok(Json(response))
}

/// POST /daemon/fail
/// Mark an owned job failed.
pub async fn fail_job(
    State(server): State<Arc<Server>>,
    Json(request): Json<FailedJob>,
) -> ApiResult<StatusCode> {
    tracing::info!("daemon failing job {}: {}", request.job_id, request.error);
    server.fail_job(request).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /daemon/complete
/// Mark an owned job completed and materialize its resources.
pub async fn complete_job(
    State(server): State<Arc<Server>>,
    Json(request): Json<CompletedJob>,
) -> ApiResult<StatusCode> {
    tracing::info!("daemon completing job {}", request.job_id);
    server.complete_job(request).await?;
    Ok(StatusCode::NO_CONTENT)
}
