//! Job acquisition
//!
//! The debounced acquire path: lock a queued job in the store, hydrate its
//! workspace/template/user context into the wire envelope, and hand it to
//! the calling daemon. A job that cannot be hydrated is force-marked
//! terminal so it can't be re-acquired forever.

use std::time::Instant;

use chrono::Utc;

use foundry_core::codec;
use foundry_core::domain::job::{JobType, ProvisionerJob, StorageMethod};
use foundry_core::dto::job::{
    AcquiredJob, AcquiredJobKind, ProvisionMetadata, TemplateDryRunJob, TemplateImportJob,
    WorkspaceBuildJob,
};
use foundry_core::dto::MAX_MESSAGE_SIZE;

use crate::parameter::{self, ComputeScope};
use crate::service::{
    computed_values_to_wire, parse_input, workspace_channel, JobError, Server,
    TemplateDryRunInput, WorkspaceBuildInput,
};
use crate::store::{AcquireJobParams, CompleteJobParams, StoreError};

impl Server {
    /// Locks the oldest eligible job for this server and returns its wire
    /// envelope. Returns the empty envelope when no work is available.
    pub async fn acquire_job(&self) -> Result<AcquiredJob, JobError> {
        // This prevents a fleet of idle daemons from hammering the store:
        // after an empty acquire, further acquires return empty without a
        // query until the debounce interval has passed. Freshly enqueued
        // jobs wait at most one interval.
        {
            let last = self
                .last_empty_acquire
                .read()
                .unwrap_or_else(|err| err.into_inner());
            if let Some(last) = *last {
                if last.elapsed() < self.acquire_debounce {
                    return Ok(AcquiredJob::empty());
                }
            }
        }

        let job = match self
            .store
            .acquire_job(AcquireJobParams {
                started_at: Utc::now(),
                worker_id: self.id,
                types: self.provisioners.clone(),
                tags: self.tags.clone(),
            })
            .await
        {
            Ok(job) => job,
            Err(StoreError::NoRowsAvailable) => {
                let mut last = self
                    .last_empty_acquire
                    .write()
                    .unwrap_or_else(|err| err.into_inner());
                *last = Some(Instant::now());
                return Ok(AcquiredJob::empty());
            }
            Err(err) => return Err(err.into()),
        };
        {
            let mut last = self
                .last_empty_acquire
                .write()
                .unwrap_or_else(|err| err.into_inner());
            *last = None;
        }
        tracing::debug!("locked job {} from store", job.id);

        match self.hydrate_acquired_job(&job).await {
            Ok(acquired) => Ok(acquired),
            Err(cause) => Err(self.invalidate_job(&job, cause).await),
        }
    }

    /// Marks an acquired job terminal with the hydration error. This is the
    /// one error path that writes terminal state.
    async fn invalidate_job(&self, job: &ProvisionerJob, cause: JobError) -> JobError {
        let message = cause.to_string();
        tracing::warn!("invalidating job {}: {}", job.id, message);
        let now = Utc::now();
        let result = self
            .store
            .update_job_completed(CompleteJobParams {
                id: job.id,
                updated_at: now,
                completed_at: now,
                error: Some(message.clone()),
            })
            .await;
        match result {
            Ok(()) => JobError::Invalidated(message),
            Err(err) => {
                tracing::error!("failed to invalidate job {}: {}", job.id, err);
                err.into()
            }
        }
    }

    async fn hydrate_acquired_job(&self, job: &ProvisionerJob) -> Result<AcquiredJob, JobError> {
        let initiator = self.store.get_user(job.initiator_id).await?;

        let mut acquired = AcquiredJob {
            job_id: job.id.to_string(),
            created_at: job.created_at.timestamp_millis(),
            provisioner: job.provisioner.as_str().to_string(),
            user_name: initiator.username,
            template_source_archive: Vec::new(),
            kind: None,
        };

        match job.job_type {
            JobType::WorkspaceBuild => {
                let input: WorkspaceBuildInput = parse_input(job)?;
                let build = self.store.get_workspace_build(input.workspace_build_id).await?;
                let workspace = self.store.get_workspace(build.workspace_id).await?;
                let version = self
                    .store
                    .get_template_version(build.template_version_id)
                    .await?;
                let template_id = version.template_id.ok_or_else(|| {
                    JobError::Protocol(format!(
                        "template version {} has no template",
                        version.id
                    ))
                })?;
                let template = self.store.get_template(template_id).await?;
                let owner = self.store.get_user(workspace.owner_id).await?;

                self.pubsub
                    .publish(&workspace_channel(workspace.id), b"")
                    .await?;

                // Compute parameters for the workspace to consume.
                let computed = parameter::compute(
                    self.store(),
                    &ComputeScope {
                        template_import_job_id: version.job_id,
                        template_id: Some(template.id),
                        workspace_id: Some(workspace.id),
                        additional_values: Vec::new(),
                    },
                )
                .await?;
                let parameter_values = computed_values_to_wire(computed)?;

                acquired.kind = Some(AcquiredJobKind::WorkspaceBuild(WorkspaceBuildJob {
                    workspace_build_id: build.id.to_string(),
                    workspace_name: workspace.name.clone(),
                    state: build.provisioner_state.clone(),
                    parameter_values,
                    metadata: ProvisionMetadata {
                        access_url: self.access_url.clone(),
                        workspace_transition: Some(codec::transition_to_wire(build.transition)),
                        workspace_name: workspace.name,
                        workspace_owner: owner.username,
                        workspace_owner_email: owner.email,
                        workspace_id: workspace.id.to_string(),
                        workspace_owner_id: owner.id.to_string(),
                    },
                }));
            }
            JobType::TemplateVersionDryRun => {
                let input: TemplateDryRunInput = parse_input(job)?;
                let version = self
                    .store
                    .get_template_version(input.template_version_id)
                    .await?;

                let computed = parameter::compute(
                    self.store(),
                    &ComputeScope {
                        template_import_job_id: version.job_id,
                        template_id: version.template_id,
                        workspace_id: None,
                        additional_values: input.parameter_values,
                    },
                )
                .await?;
                let parameter_values = computed_values_to_wire(computed)?;

                acquired.kind = Some(AcquiredJobKind::TemplateDryRun(TemplateDryRunJob {
                    parameter_values,
                    metadata: ProvisionMetadata {
                        access_url: self.access_url.clone(),
                        workspace_name: input.workspace_name,
                        ..Default::default()
                    },
                }));
            }
            JobType::TemplateVersionImport => {
                acquired.kind = Some(AcquiredJobKind::TemplateImport(TemplateImportJob {
                    metadata: ProvisionMetadata {
                        access_url: self.access_url.clone(),
                        ..Default::default()
                    },
                }));
            }
        }

        match job.storage_method {
            StorageMethod::File => {
                let file = self.store.get_file(job.file_id).await?;
                acquired.template_source_archive = file.data;
            }
        }

        let size = serde_json::to_vec(&acquired)
            .map_err(|err| JobError::Protocol(format!("serialize acquired job: {err}")))?
            .len();
        if size > MAX_MESSAGE_SIZE {
            return Err(JobError::Protocol(format!(
                "payload was too big: {size} > {MAX_MESSAGE_SIZE}"
            )));
        }

        Ok(acquired)
    }
}
