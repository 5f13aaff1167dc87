//! Terminal outcomes
//!
//! Fail and Complete: the two ways a job leaves this engine. Complete's
//! multi-write variants run inside one store transaction; the terminal
//! log sentinel publishes only after the job row is terminal.

use std::collections::HashSet;

use chrono::{Duration, Utc};

use foundry_core::domain::workspace::WorkspaceTransition;
use foundry_core::dto::job::{CompletedJob, CompletedJobKind, FailedJob, FailedJobKind};

use crate::service::resources::insert_workspace_resource;
use crate::service::{
    job_logs_channel, parse_input, parse_job_id, workspace_channel, JobError,
    JobLogsNotifyMessage, Server, WorkspaceBuildInput,
};
use crate::store::{CompleteJobParams, Store, UpdateWorkspaceBuildParams};

impl Server {
    /// Marks a job failed. For workspace builds carrying a state blob, the
    /// build's provisioner state is updated too; its deadline is not.
    pub async fn fail_job(&self, request: FailedJob) -> Result<(), JobError> {
        let job_id = parse_job_id(&request.job_id)?;
        tracing::debug!("failing job {}", job_id);
        let job = self.owned_job(job_id).await?;
        if job.is_terminal() {
            return Err(JobError::AlreadyCompleted);
        }

        let now = Utc::now();
        let error = Some(request.error).filter(|error| !error.is_empty());
        self.store
            .update_job_completed(CompleteJobParams {
                id: job_id,
                updated_at: now,
                completed_at: now,
                error,
            })
            .await?;

        if let Some(FailedJobKind::WorkspaceBuild(failed_build)) = &request.kind {
            if let Some(state) = &failed_build.state {
                let input: WorkspaceBuildInput = parse_input(&job)?;
                let build = self.store.get_workspace_build(input.workspace_build_id).await?;
                self.store
                    .update_workspace_build(UpdateWorkspaceBuildParams {
                        id: build.id,
                        updated_at: now,
                        provisioner_state: state.clone(),
                        // Explicitly not updating the deadline here.
                        deadline: build.deadline,
                    })
                    .await?;
                self.pubsub
                    .publish(&workspace_channel(build.workspace_id), b"")
                    .await?;
            }
        }

        self.publish_end_of_logs(job_id).await
    }

    /// Marks a job completed, materializing the resources it reported.
    ///
    /// Not idempotent: a second Complete re-materializes resources, so
    /// daemons must only retry on transport failures that preceded the
    /// acknowledgement.
    pub async fn complete_job(&self, request: CompletedJob) -> Result<(), JobError> {
        let job_id = parse_job_id(&request.job_id)?;
        tracing::debug!("completing job {}", job_id);
        let job = self.owned_job(job_id).await?;

        let Some(kind) = request.kind else {
            return Err(JobError::Protocol(
                "job type payload must be provided".to_string(),
            ));
        };

        match kind {
            CompletedJobKind::TemplateImport(import) => {
                let now = Utc::now();
                let tx = self.store.begin().await?;
                let db: &dyn Store = &*tx;
                let mut app_slugs = HashSet::new();
                for (transition, resources) in [
                    (WorkspaceTransition::Start, &import.start_resources),
                    (WorkspaceTransition::Stop, &import.stop_resources),
                ] {
                    for resource in resources {
                        tracing::info!(
                            "inserting {} resource {} ({}) for import job {}",
                            transition.as_str(),
                            resource.name,
                            resource.resource_type,
                            job_id,
                        );
                        insert_workspace_resource(db, job_id, transition, resource, &mut app_slugs)
                            .await?;
                    }
                }
                tx.update_job_completed(CompleteJobParams {
                    id: job_id,
                    updated_at: now,
                    completed_at: now,
                    error: None,
                })
                .await?;
                tx.commit().await?;
                tracing::debug!("marked import job {} as completed", job_id);
            }
            CompletedJobKind::WorkspaceBuild(completed_build) => {
                let input: WorkspaceBuildInput = parse_input(&job)?;
                let build = self.store.get_workspace_build(input.workspace_build_id).await?;

                let now = Utc::now();
                let tx = self.store.begin().await?;
                let db: &dyn Store = &*tx;

                // The workspace deadline restarts from now when a TTL is
                // set; an unset TTL clears it.
                let deadline = match db.get_workspace(build.workspace_id).await {
                    Ok(workspace) => workspace
                        .ttl_millis
                        .map(|ttl| now + Duration::milliseconds(ttl)),
                    Err(err) => {
                        // Since this is only for the TTL, try to continue.
                        tracing::error!(
                            "fetch workspace {} for build {}: {}",
                            build.workspace_id,
                            build.id,
                            err
                        );
                        None
                    }
                };

                tx.update_job_completed(CompleteJobParams {
                    id: job_id,
                    updated_at: now,
                    completed_at: now,
                    error: None,
                })
                .await?;
                tx.update_workspace_build(UpdateWorkspaceBuildParams {
                    id: build.id,
                    updated_at: now,
                    provisioner_state: completed_build.state.clone(),
                    deadline,
                })
                .await?;

                let mut app_slugs = HashSet::new();
                for resource in &completed_build.resources {
                    insert_workspace_resource(
                        db,
                        job_id,
                        build.transition,
                        resource,
                        &mut app_slugs,
                    )
                    .await?;
                }

                if build.transition == WorkspaceTransition::Delete {
                    tx.update_workspace_deleted(build.workspace_id, true).await?;
                }

                tx.commit().await?;

                self.pubsub
                    .publish(&workspace_channel(build.workspace_id), b"")
                    .await?;
            }
            CompletedJobKind::TemplateDryRun(dry_run) => {
                let now = Utc::now();
                let tx = self.store.begin().await?;
                let db: &dyn Store = &*tx;
                let mut app_slugs = HashSet::new();
                for resource in &dry_run.resources {
                    tracing::info!(
                        "inserting resource {} ({}) for dry-run job {}",
                        resource.name,
                        resource.resource_type,
                        job_id,
                    );
                    insert_workspace_resource(
                        db,
                        job_id,
                        WorkspaceTransition::Start,
                        resource,
                        &mut app_slugs,
                    )
                    .await?;
                }
                tx.update_job_completed(CompleteJobParams {
                    id: job_id,
                    updated_at: now,
                    completed_at: now,
                    error: None,
                })
                .await?;
                tx.commit().await?;
                tracing::debug!("marked dry-run job {} as completed", job_id);
            }
        }

        self.publish_end_of_logs(job_id).await?;
        tracing::debug!("completed job {}", job_id);
        Ok(())
    }

    /// Publishes the terminal log sentinel. Runs after the terminal row
    /// write, so a subscriber seeing it can trust the job row is terminal.
    async fn publish_end_of_logs(&self, job_id: uuid::Uuid) -> Result<(), JobError> {
        let message = serde_json::to_vec(&JobLogsNotifyMessage {
            created_after: 0,
            end_of_logs: true,
        })
        .map_err(|err| JobError::Protocol(format!("marshal log notification: {err}")))?;
        self.pubsub
            .publish(&job_logs_channel(job_id), &message)
            .await?;
        Ok(())
    }
}
