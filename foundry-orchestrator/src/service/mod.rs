//! Dispatch engine
//!
//! The provisioner-daemon facing services: acquire with debounce, progress
//! updates, terminal outcomes, and resource materialization. Each submodule
//! implements one slice of the job lifecycle on [`Server`].

pub mod acquire;
pub mod quota;
pub mod resources;
pub mod terminate;
pub mod update;

use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use foundry_core::codec::CodecError;
use foundry_core::domain::job::{JobLog, ProvisionerJob, ProvisionerKind};
use foundry_core::domain::parameter::ParameterValue;

use crate::parameter::ComputeError;
use crate::pubsub::{Pubsub, PubsubError};
use crate::service::quota::QuotaCommitter;
use crate::store::{Store, StoreError};

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("parse job id {0:?}")]
    InvalidJobId(String),
    #[error("you don't own this job")]
    NotOwner,
    #[error("job isn't running yet")]
    NotStarted,
    #[error("job already completed")]
    AlreadyCompleted,
    /// The acquired job could not be hydrated and was force-marked
    /// terminal so it cannot be re-acquired forever.
    #[error("job was invalidated: {0}")]
    Invalidated(String),
    #[error("{0}")]
    Protocol(String),
    #[error("invalid app slug {0:?}")]
    InvalidSlug(String),
    #[error("duplicate app slug, must be unique per template: {0:?}")]
    DuplicateSlug(String),
    #[error("invalid auth token format; must be uuid: {0}")]
    InvalidAuthToken(uuid::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("compute parameters: {0}")]
    Parameters(#[from] ComputeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("publish notification: {0}")]
    Pubsub(#[from] PubsubError),
}

/// Server configuration and collaborators.
pub struct ServerOptions {
    /// Identity stamped onto acquired jobs; ownership checks compare
    /// against it.
    pub id: Uuid,
    /// External URL of this deployment, handed to provisioners.
    pub access_url: String,
    /// Provisioner kinds this server dispatches.
    pub provisioners: Vec<ProvisionerKind>,
    /// Tag set jobs must be a subset of to be acquired.
    pub tags: serde_json::Value,
    pub store: Arc<dyn Store>,
    pub pubsub: Arc<dyn Pubsub>,
    /// Minimum interval between store-hitting acquires after an empty
    /// result.
    pub acquire_debounce: Duration,
}

/// The provisioner job dispatch server.
///
/// One instance per deployment process. All RPC entry points live here;
/// the only process-wide mutable state is the acquire debounce timestamp.
pub struct Server {
    id: Uuid,
    access_url: String,
    provisioners: Vec<ProvisionerKind>,
    tags: serde_json::Value,
    store: Arc<dyn Store>,
    pubsub: Arc<dyn Pubsub>,
    acquire_debounce: Duration,
    last_empty_acquire: RwLock<Option<Instant>>,
    quota_committer: OnceLock<Arc<dyn QuotaCommitter>>,
}

impl Server {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            id: options.id,
            access_url: options.access_url,
            provisioners: options.provisioners,
            tags: options.tags,
            store: options.store,
            pubsub: options.pubsub,
            acquire_debounce: options.acquire_debounce,
            last_empty_acquire: RwLock::new(None),
            quota_committer: OnceLock::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Installs the licensed quota committer. At most one install, at
    /// startup; the commit path reads the slot lock-free.
    pub fn install_quota_committer(&self, committer: Arc<dyn QuotaCommitter>) {
        if self.quota_committer.set(committer).is_err() {
            tracing::warn!("quota committer already installed; ignoring");
        }
    }

    /// Logs for a job with ids above `after`; the read side of the
    /// `created_after` notify cursor.
    pub async fn job_logs(&self, job_id: Uuid, after: i64) -> Result<Vec<JobLog>, JobError> {
        // Ensure the job exists so unknown ids 404 instead of reading empty.
        self.store.get_provisioner_job(job_id).await?;
        Ok(self.store.get_job_logs_after(job_id, after).await?)
    }

    /// Resources materialized by a job's completion.
    pub async fn job_resources(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<foundry_core::domain::resource::WorkspaceResource>, JobError> {
        self.store.get_provisioner_job(job_id).await?;
        Ok(self.store.get_workspace_resources_by_job(job_id).await?)
    }

    /// Fetches a job and verifies this server owns it.
    pub(crate) async fn owned_job(&self, job_id: Uuid) -> Result<ProvisionerJob, JobError> {
        let job = self.store.get_provisioner_job(job_id).await?;
        let worker_id = job.worker_id.ok_or(JobError::NotStarted)?;
        if worker_id != self.id {
            return Err(JobError::NotOwner);
        }
        Ok(job)
    }
}

pub(crate) fn parse_job_id(raw: &str) -> Result<Uuid, JobError> {
    Uuid::parse_str(raw).map_err(|_| JobError::InvalidJobId(raw.to_string()))
}

/// Decodes a job's opaque input payload into its typed form.
pub(crate) fn parse_input<T>(job: &ProvisionerJob) -> Result<T, JobError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(job.input.clone())
        .map_err(|err| JobError::Protocol(format!("unmarshal job input: {err}")))
}

/// Renders resolved parameters to their wire form.
pub(crate) fn computed_values_to_wire(
    values: Vec<crate::parameter::ComputedValue>,
) -> Result<Vec<foundry_core::dto::parameter::ParameterValue>, JobError> {
    values
        .into_iter()
        .map(|value| {
            Ok(foundry_core::dto::parameter::ParameterValue {
                destination_scheme: foundry_core::codec::parameter_destination_scheme_to_wire(
                    value.destination_scheme,
                )?,
                name: value.name,
                value: value.source_value,
            })
        })
        .collect()
}

// =============================================================================
// Notification channels
// =============================================================================

/// Channel carrying incremental log notifications for one job.
pub fn job_logs_channel(job_id: Uuid) -> String {
    format!("provisioner-log-logs:{job_id}")
}

/// Channel telling subscribers to re-fetch one workspace.
pub fn workspace_channel(workspace_id: Uuid) -> String {
    format!("workspace:{workspace_id}")
}

/// Payload published on the per-job log channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobLogsNotifyMessage {
    /// Subscribers fetch logs with ids above this.
    pub created_after: i64,
    /// Terminal sentinel; published only after the job row is terminal.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub end_of_logs: bool,
}

// =============================================================================
// Job input payloads
// =============================================================================

/// Input payload of a workspace-build job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceBuildInput {
    pub workspace_build_id: Uuid,
    #[serde(default)]
    pub dry_run: bool,
}

/// Input payload of a template-dry-run job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDryRunInput {
    pub template_version_id: Uuid,
    #[serde(default)]
    pub workspace_name: String,
    #[serde(default)]
    pub parameter_values: Vec<ParameterValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_message_wire_form() {
        let incremental = serde_json::to_string(&JobLogsNotifyMessage {
            created_after: 40,
            end_of_logs: false,
        })
        .unwrap();
        assert_eq!(incremental, r#"{"created_after":40}"#);

        let sentinel = serde_json::to_string(&JobLogsNotifyMessage {
            created_after: 0,
            end_of_logs: true,
        })
        .unwrap();
        assert_eq!(sentinel, r#"{"created_after":0,"end_of_logs":true}"#);
    }

    #[test]
    fn parse_job_id_rejects_garbage() {
        assert!(parse_job_id("not-a-uuid").is_err());
        assert!(parse_job_id("").is_err());
        assert!(parse_job_id("0badc0de-0000-4000-8000-000000000000").is_ok());
    }
}
