//! In-memory store
//!
//! A map-backed [`Store`] used by the test suite and development tooling.
//! Transactions stage a working copy of the whole state and swap it in on
//! commit; transactions are serialized against each other, and plain writes
//! follow last-write-wins semantics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use foundry_core::domain::job::{JobLog, ProvisionerJob};
use foundry_core::domain::parameter::{ParameterScope, ParameterSchema, ParameterValue};
use foundry_core::domain::resource::{
    WorkspaceAgent, WorkspaceApp, WorkspaceResource, WorkspaceResourceMetadatum,
};
use foundry_core::domain::template::{File, Template, TemplateVersion};
use foundry_core::domain::user::User;
use foundry_core::domain::workspace::{Workspace, WorkspaceBuild};

use super::{
    AcquireJobParams, CompleteJobParams, InsertJobLogsParams, Store, StoreError, StoreTx,
    UpdateWorkspaceBuildParams,
};

#[derive(Debug, Clone, Default)]
struct State {
    jobs: Vec<ProvisionerJob>,
    job_logs: Vec<JobLog>,
    next_log_id: i64,
    users: Vec<User>,
    files: Vec<File>,
    templates: Vec<Template>,
    template_versions: Vec<TemplateVersion>,
    workspaces: Vec<Workspace>,
    workspace_builds: Vec<WorkspaceBuild>,
    parameter_schemas: Vec<ParameterSchema>,
    parameter_values: Vec<ParameterValue>,
    resources: Vec<WorkspaceResource>,
    agents: Vec<WorkspaceAgent>,
    apps: Vec<WorkspaceApp>,
    metadata: Vec<WorkspaceResourceMetadatum>,
    next_metadatum_id: i64,
}

/// A job matches when every tag it carries is present on the worker.
fn tags_match(job_tags: &serde_json::Value, worker_tags: &serde_json::Value) -> bool {
    let Some(job_tags) = job_tags.as_object() else {
        return true;
    };
    job_tags
        .iter()
        .all(|(key, value)| worker_tags.get(key) == Some(value))
}

impl State {
    fn acquire_job(&mut self, params: &AcquireJobParams) -> Result<ProvisionerJob, StoreError> {
        let job = self
            .jobs
            .iter_mut()
            .filter(|job| {
                job.started_at.is_none()
                    && job.canceled_at.is_none()
                    && job.completed_at.is_none()
                    && params.types.contains(&job.provisioner)
                    && tags_match(&job.tags, &params.tags)
            })
            .min_by_key(|job| job.created_at)
            .ok_or(StoreError::NoRowsAvailable)?;
        job.worker_id = Some(params.worker_id);
        job.started_at = Some(params.started_at);
        job.updated_at = Some(params.started_at);
        Ok(job.clone())
    }

    fn get_job(&self, id: Uuid) -> Result<ProvisionerJob, StoreError> {
        self.jobs
            .iter()
            .find(|job| job.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("provisioner job", id))
    }

    fn job_mut(&mut self, id: Uuid) -> Result<&mut ProvisionerJob, StoreError> {
        self.jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or_else(|| StoreError::not_found("provisioner job", id))
    }

    fn update_job_completed(&mut self, params: &CompleteJobParams) -> Result<(), StoreError> {
        let job = self.job_mut(params.id)?;
        job.updated_at = Some(params.updated_at);
        job.completed_at = Some(params.completed_at);
        job.error = params.error.clone();
        Ok(())
    }

    fn insert_job_logs(&mut self, params: &InsertJobLogsParams) -> Vec<JobLog> {
        let mut inserted = Vec::with_capacity(params.created_at.len());
        for index in 0..params.created_at.len() {
            self.next_log_id += 1;
            let log = JobLog {
                id: self.next_log_id,
                job_id: params.job_id,
                created_at: params.created_at[index],
                source: params.source[index],
                level: params.level[index],
                stage: params.stage[index].clone(),
                output: params.output[index].clone(),
            };
            self.job_logs.push(log.clone());
            inserted.push(log);
        }
        inserted
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`Store`] backend.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    tx_lock: Arc<tokio::sync::Mutex<()>>,
    acquires: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many acquires reached this store. Instrumentation for the fake;
    /// the debounce tests assert on it.
    pub fn acquire_count(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn acquire_job(&self, params: AcquireJobParams) -> Result<ProvisionerJob, StoreError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        lock(&self.state).acquire_job(&params)
    }

    async fn get_provisioner_job(&self, id: Uuid) -> Result<ProvisionerJob, StoreError> {
        lock(&self.state).get_job(id)
    }

    async fn insert_provisioner_job(&self, job: ProvisionerJob) -> Result<(), StoreError> {
        lock(&self.state).jobs.push(job);
        Ok(())
    }

    async fn update_job(&self, id: Uuid, updated_at: DateTime<Utc>) -> Result<(), StoreError> {
        lock(&self.state).job_mut(id)?.updated_at = Some(updated_at);
        Ok(())
    }

    async fn update_job_completed(&self, params: CompleteJobParams) -> Result<(), StoreError> {
        lock(&self.state).update_job_completed(&params)
    }

    async fn update_job_canceled(
        &self,
        id: Uuid,
        canceled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        let job = state.job_mut(id)?;
        job.canceled_at = Some(canceled_at);
        job.updated_at = Some(canceled_at);
        Ok(())
    }

    async fn insert_job_logs(
        &self,
        params: InsertJobLogsParams,
    ) -> Result<Vec<JobLog>, StoreError> {
        Ok(lock(&self.state).insert_job_logs(&params))
    }

    async fn get_job_logs_after(
        &self,
        job_id: Uuid,
        after: i64,
    ) -> Result<Vec<JobLog>, StoreError> {
        let mut logs: Vec<JobLog> = lock(&self.state)
            .job_logs
            .iter()
            .filter(|log| log.job_id == job_id && log.id > after)
            .cloned()
            .collect();
        logs.sort_by_key(|log| log.id);
        Ok(logs)
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StoreError> {
        lock(&self.state)
            .users
            .iter()
            .find(|user| user.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", id))
    }

    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        lock(&self.state).users.push(user);
        Ok(())
    }

    async fn get_file(&self, id: Uuid) -> Result<File, StoreError> {
        lock(&self.state)
            .files
            .iter()
            .find(|file| file.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("file", id))
    }

    async fn insert_file(&self, file: File) -> Result<(), StoreError> {
        lock(&self.state).files.push(file);
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> Result<Template, StoreError> {
        lock(&self.state)
            .templates
            .iter()
            .find(|template| template.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("template", id))
    }

    async fn insert_template(&self, template: Template) -> Result<(), StoreError> {
        lock(&self.state).templates.push(template);
        Ok(())
    }

    async fn get_template_version(&self, id: Uuid) -> Result<TemplateVersion, StoreError> {
        lock(&self.state)
            .template_versions
            .iter()
            .find(|version| version.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("template version", id))
    }

    async fn get_template_version_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<TemplateVersion, StoreError> {
        lock(&self.state)
            .template_versions
            .iter()
            .find(|version| version.job_id == job_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("template version", job_id))
    }

    async fn insert_template_version(&self, version: TemplateVersion) -> Result<(), StoreError> {
        lock(&self.state).template_versions.push(version);
        Ok(())
    }

    async fn update_template_version_description_by_job(
        &self,
        job_id: Uuid,
        readme: String,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        let version = state
            .template_versions
            .iter_mut()
            .find(|version| version.job_id == job_id)
            .ok_or_else(|| StoreError::not_found("template version", job_id))?;
        version.readme = readme;
        version.updated_at = Some(updated_at);
        Ok(())
    }

    async fn get_workspace(&self, id: Uuid) -> Result<Workspace, StoreError> {
        lock(&self.state)
            .workspaces
            .iter()
            .find(|workspace| workspace.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("workspace", id))
    }

    async fn insert_workspace(&self, workspace: Workspace) -> Result<(), StoreError> {
        lock(&self.state).workspaces.push(workspace);
        Ok(())
    }

    async fn update_workspace_deleted(&self, id: Uuid, deleted: bool) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        let workspace = state
            .workspaces
            .iter_mut()
            .find(|workspace| workspace.id == id)
            .ok_or_else(|| StoreError::not_found("workspace", id))?;
        workspace.deleted = deleted;
        Ok(())
    }

    async fn get_workspace_build(&self, id: Uuid) -> Result<WorkspaceBuild, StoreError> {
        lock(&self.state)
            .workspace_builds
            .iter()
            .find(|build| build.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("workspace build", id))
    }

    async fn insert_workspace_build(&self, build: WorkspaceBuild) -> Result<(), StoreError> {
        lock(&self.state).workspace_builds.push(build);
        Ok(())
    }

    async fn update_workspace_build(
        &self,
        params: UpdateWorkspaceBuildParams,
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        let build = state
            .workspace_builds
            .iter_mut()
            .find(|build| build.id == params.id)
            .ok_or_else(|| StoreError::not_found("workspace build", params.id))?;
        build.updated_at = Some(params.updated_at);
        build.provisioner_state = params.provisioner_state;
        build.deadline = params.deadline;
        Ok(())
    }

    async fn insert_parameter_schema(&self, schema: ParameterSchema) -> Result<(), StoreError> {
        lock(&self.state).parameter_schemas.push(schema);
        Ok(())
    }

    async fn get_parameter_schemas_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<ParameterSchema>, StoreError> {
        let mut schemas: Vec<ParameterSchema> = lock(&self.state)
            .parameter_schemas
            .iter()
            .filter(|schema| schema.job_id == job_id)
            .cloned()
            .collect();
        schemas.sort_by_key(|schema| schema.index);
        Ok(schemas)
    }

    async fn insert_parameter_value(&self, value: ParameterValue) -> Result<(), StoreError> {
        lock(&self.state).parameter_values.push(value);
        Ok(())
    }

    async fn parameter_values_by_scope(
        &self,
        scope: ParameterScope,
        scope_id: Uuid,
    ) -> Result<Vec<ParameterValue>, StoreError> {
        Ok(lock(&self.state)
            .parameter_values
            .iter()
            .filter(|value| value.scope == scope && value.scope_id == scope_id)
            .cloned()
            .collect())
    }

    async fn insert_workspace_resource(
        &self,
        resource: WorkspaceResource,
    ) -> Result<(), StoreError> {
        lock(&self.state).resources.push(resource);
        Ok(())
    }

    async fn get_workspace_resources_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<WorkspaceResource>, StoreError> {
        Ok(lock(&self.state)
            .resources
            .iter()
            .filter(|resource| resource.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn insert_workspace_agent(&self, agent: WorkspaceAgent) -> Result<(), StoreError> {
        lock(&self.state).agents.push(agent);
        Ok(())
    }

    async fn insert_workspace_app(&self, app: WorkspaceApp) -> Result<(), StoreError> {
        lock(&self.state).apps.push(app);
        Ok(())
    }

    async fn insert_workspace_resource_metadata(
        &self,
        mut metadatum: WorkspaceResourceMetadatum,
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        state.next_metadatum_id += 1;
        metadatum.id = state.next_metadatum_id;
        state.metadata.push(metadatum);
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.tx_lock.clone().lock_owned().await;
        let snapshot = lock(&self.state).clone();
        Ok(Box::new(InMemoryTx {
            working: InMemoryStore {
                state: Arc::new(Mutex::new(snapshot)),
                tx_lock: Arc::new(tokio::sync::Mutex::new(())),
                acquires: self.acquires.clone(),
            },
            parent: self.state.clone(),
            _guard: guard,
        }))
    }
}

/// Staged working copy of the state; swapped into the parent on commit.
struct InMemoryTx {
    working: InMemoryStore,
    parent: Arc<Mutex<State>>,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl Store for InMemoryTx {
    async fn acquire_job(&self, params: AcquireJobParams) -> Result<ProvisionerJob, StoreError> {
        self.working.acquire_job(params).await
    }

    async fn get_provisioner_job(&self, id: Uuid) -> Result<ProvisionerJob, StoreError> {
        self.working.get_provisioner_job(id).await
    }

    async fn insert_provisioner_job(&self, job: ProvisionerJob) -> Result<(), StoreError> {
        self.working.insert_provisioner_job(job).await
    }

    async fn update_job(&self, id: Uuid, updated_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.working.update_job(id, updated_at).await
    }

    async fn update_job_completed(&self, params: CompleteJobParams) -> Result<(), StoreError> {
        self.working.update_job_completed(params).await
    }

    async fn update_job_canceled(
        &self,
        id: Uuid,
        canceled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.working.update_job_canceled(id, canceled_at).await
    }

    async fn insert_job_logs(
        &self,
        params: InsertJobLogsParams,
    ) -> Result<Vec<JobLog>, StoreError> {
        self.working.insert_job_logs(params).await
    }

    async fn get_job_logs_after(
        &self,
        job_id: Uuid,
        after: i64,
    ) -> Result<Vec<JobLog>, StoreError> {
        self.working.get_job_logs_after(job_id, after).await
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StoreError> {
        self.working.get_user(id).await
    }

    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        self.working.insert_user(user).await
    }

    async fn get_file(&self, id: Uuid) -> Result<File, StoreError> {
        self.working.get_file(id).await
    }

    async fn insert_file(&self, file: File) -> Result<(), StoreError> {
        self.working.insert_file(file).await
    }

    async fn get_template(&self, id: Uuid) -> Result<Template, StoreError> {
        self.working.get_template(id).await
    }

    async fn insert_template(&self, template: Template) -> Result<(), StoreError> {
        self.working.insert_template(template).await
    }

    async fn get_template_version(&self, id: Uuid) -> Result<TemplateVersion, StoreError> {
        self.working.get_template_version(id).await
    }

    async fn get_template_version_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<TemplateVersion, StoreError> {
        self.working.get_template_version_by_job(job_id).await
    }

    async fn insert_template_version(&self, version: TemplateVersion) -> Result<(), StoreError> {
        self.working.insert_template_version(version).await
    }

    async fn update_template_version_description_by_job(
        &self,
        job_id: Uuid,
        readme: String,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.working
            .update_template_version_description_by_job(job_id, readme, updated_at)
            .await
    }

    async fn get_workspace(&self, id: Uuid) -> Result<Workspace, StoreError> {
        self.working.get_workspace(id).await
    }

    async fn insert_workspace(&self, workspace: Workspace) -> Result<(), StoreError> {
        self.working.insert_workspace(workspace).await
    }

    async fn update_workspace_deleted(&self, id: Uuid, deleted: bool) -> Result<(), StoreError> {
        self.working.update_workspace_deleted(id, deleted).await
    }

    async fn get_workspace_build(&self, id: Uuid) -> Result<WorkspaceBuild, StoreError> {
        self.working.get_workspace_build(id).await
    }

    async fn insert_workspace_build(&self, build: WorkspaceBuild) -> Result<(), StoreError> {
        self.working.insert_workspace_build(build).await
    }

    async fn update_workspace_build(
        &self,
        params: UpdateWorkspaceBuildParams,
    ) -> Result<(), StoreError> {
        self.working.update_workspace_build(params).await
    }

    async fn insert_parameter_schema(&self, schema: ParameterSchema) -> Result<(), StoreError> {
        self.working.insert_parameter_schema(schema).await
    }

    async fn get_parameter_schemas_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<ParameterSchema>, StoreError> {
        self.working.get_parameter_schemas_by_job(job_id).await
    }

    async fn insert_parameter_value(&self, value: ParameterValue) -> Result<(), StoreError> {
        self.working.insert_parameter_value(value).await
    }

    async fn parameter_values_by_scope(
        &self,
        scope: ParameterScope,
        scope_id: Uuid,
    ) -> Result<Vec<ParameterValue>, StoreError> {
        self.working.parameter_values_by_scope(scope, scope_id).await
    }

    async fn insert_workspace_resource(
        &self,
        resource: WorkspaceResource,
    ) -> Result<(), StoreError> {
        self.working.insert_workspace_resource(resource).await
    }

    async fn get_workspace_resources_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<WorkspaceResource>, StoreError> {
        self.working.get_workspace_resources_by_job(job_id).await
    }

    async fn insert_workspace_agent(&self, agent: WorkspaceAgent) -> Result<(), StoreError> {
        self.working.insert_workspace_agent(agent).await
    }

    async fn insert_workspace_app(&self, app: WorkspaceApp) -> Result<(), StoreError> {
        self.working.insert_workspace_app(app).await
    }

    async fn insert_workspace_resource_metadata(
        &self,
        metadatum: WorkspaceResourceMetadatum,
    ) -> Result<(), StoreError> {
        self.working.insert_workspace_resource_metadata(metadatum).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        Err(StoreError::NestedTransaction)
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let working = lock(&self.working.state).clone();
        *lock(&self.parent) = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
