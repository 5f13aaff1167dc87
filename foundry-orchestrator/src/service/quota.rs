//! Quota commit
//!
//! An optional capability injected by licensed builds. Without one
//! installed, commits always succeed with an unlimited budget.

use async_trait::async_trait;

use foundry_core::dto::job::{CommitQuotaRequest, CommitQuotaResponse};

use crate::service::{parse_job_id, JobError, Server};

/// Commit capability a licensed build installs at startup.
#[async_trait]
pub trait QuotaCommitter: Send + Sync {
    async fn commit_quota(
        &self,
        request: &CommitQuotaRequest,
    ) -> Result<CommitQuotaResponse, JobError>;
}

impl Server {
    /// Forwards a quota commit to the installed committer, after the usual
    /// ownership checks.
    pub async fn commit_quota(
        &self,
        request: CommitQuotaRequest,
    ) -> Result<CommitQuotaResponse, JobError> {
        let job_id = parse_job_id(&request.job_id)?;
        self.owned_job(job_id).await?;

        match self.quota_committer.get() {
            // Community edition, or a test.
            None => Ok(CommitQuotaResponse {
                ok: true,
                budget: -1,
            }),
            Some(committer) => committer.commit_quota(&request).await,
        }
    }
}
