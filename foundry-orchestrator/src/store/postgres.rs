//! Postgres store
//!
//! Production [`Store`] backend. Acquire serializes competing workers with
//! `FOR UPDATE SKIP LOCKED`; the loser of a race sees no row and engages
//! its debounce. Schema is owned by the migrations in `db.rs`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
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

/// Postgres-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn acquire_job(&self, params: AcquireJobParams) -> Result<ProvisionerJob, StoreError> {
        acquire_job(&self.pool, params).await
    }

    async fn get_provisioner_job(&self, id: Uuid) -> Result<ProvisionerJob, StoreError> {
        get_provisioner_job(&self.pool, id).await
    }

    async fn insert_provisioner_job(&self, job: ProvisionerJob) -> Result<(), StoreError> {
        insert_provisioner_job(&self.pool, job).await
    }

    async fn update_job(&self, id: Uuid, updated_at: DateTime<Utc>) -> Result<(), StoreError> {
        update_job(&self.pool, id, updated_at).await
    }

    async fn update_job_completed(&self, params: CompleteJobParams) -> Result<(), StoreError> {
        update_job_completed(&self.pool, params).await
    }

    async fn update_job_canceled(
        &self,
        id: Uuid,
        canceled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        update_job_canceled(&self.pool, id, canceled_at).await
    }

    async fn insert_job_logs(
        &self,
        params: InsertJobLogsParams,
    ) -> Result<Vec<JobLog>, StoreError> {
        insert_job_logs(&self.pool, params).await
    }

    async fn get_job_logs_after(
        &self,
        job_id: Uuid,
        after: i64,
    ) -> Result<Vec<JobLog>, StoreError> {
        get_job_logs_after(&self.pool, job_id, after).await
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StoreError> {
        get_user(&self.pool, id).await
    }

    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        insert_user(&self.pool, user).await
    }

    async fn get_file(&self, id: Uuid) -> Result<File, StoreError> {
        get_file(&self.pool, id).await
    }

    async fn insert_file(&self, file: File) -> Result<(), StoreError> {
        insert_file(&self.pool, file).await
    }

    async fn get_template(&self, id: Uuid) -> Result<Template, StoreError> {
        get_template(&self.pool, id).await
    }

    async fn insert_template(&self, template: Template) -> Result<(), StoreError> {
        insert_template(&self.pool, template).await
    }

    async fn get_template_version(&self, id: Uuid) -> Result<TemplateVersion, StoreError> {
        get_template_version(&self.pool, id).await
    }

    async fn get_template_version_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<TemplateVersion, StoreError> {
        get_template_version_by_job(&self.pool, job_id).await
    }

    async fn insert_template_version(&self, version: TemplateVersion) -> Result<(), StoreError> {
        insert_template_version(&self.pool, version).await
    }

    async fn update_template_version_description_by_job(
        &self,
        job_id: Uuid,
        readme: String,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        update_template_version_description_by_job(&self.pool, job_id, readme, updated_at).await
    }

    async fn get_workspace(&self, id: Uuid) -> Result<Workspace, StoreError> {
        get_workspace(&self.pool, id).await
    }

    async fn insert_workspace(&self, workspace: Workspace) -> Result<(), StoreError> {
        insert_workspace(&self.pool, workspace).await
    }

    async fn update_workspace_deleted(&self, id: Uuid, deleted: bool) -> Result<(), StoreError> {
        update_workspace_deleted(&self.pool, id, deleted).await
    }

    async fn get_workspace_build(&self, id: Uuid) -> Result<WorkspaceBuild, StoreError> {
        get_workspace_build(&self.pool, id).await
    }

    async fn insert_workspace_build(&self, build: WorkspaceBuild) -> Result<(), StoreError> {
        insert_workspace_build(&self.pool, build).await
    }

    async fn update_workspace_build(
        &self,
        params: UpdateWorkspaceBuildParams,
    ) -> Result<(), StoreError> {
        update_workspace_build(&self.pool, params).await
    }

    async fn insert_parameter_schema(&self, schema: ParameterSchema) -> Result<(), StoreError> {
        insert_parameter_schema(&self.pool, schema).await
    }

    async fn get_parameter_schemas_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<ParameterSchema>, StoreError> {
        get_parameter_schemas_by_job(&self.pool, job_id).await
    }

    async fn insert_parameter_value(&self, value: ParameterValue) -> Result<(), StoreError> {
        insert_parameter_value(&self.pool, value).await
    }

    async fn parameter_values_by_scope(
        &self,
        scope: ParameterScope,
        scope_id: Uuid,
    ) -> Result<Vec<ParameterValue>, StoreError> {
        parameter_values_by_scope(&self.pool, scope, scope_id).await
    }

    async fn insert_workspace_resource(
        &self,
        resource: WorkspaceResource,
    ) -> Result<(), StoreError> {
        insert_workspace_resource(&self.pool, resource).await
    }

    async fn get_workspace_resources_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<WorkspaceResource>, StoreError> {
        get_workspace_resources_by_job(&self.pool, job_id).await
    }

    async fn insert_workspace_agent(&self, agent: WorkspaceAgent) -> Result<(), StoreError> {
        insert_workspace_agent(&self.pool, agent).await
    }

    async fn insert_workspace_app(&self, app: WorkspaceApp) -> Result<(), StoreError> {
        insert_workspace_app(&self.pool, app).await
    }

    async fn insert_workspace_resource_metadata(
        &self,
        metadatum: WorkspaceResourceMetadatum,
    ) -> Result<(), StoreError> {
        insert_workspace_resource_metadata(&self.pool, metadatum).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx {
            tx: tokio::sync::Mutex::new(tx),
        }))
    }
}

/// A [`Store`] view over one open Postgres transaction. Dropping it without
/// committing rolls the transaction back.
pub struct PgStoreTx {
    tx: tokio::sync::Mutex<Transaction<'static, Postgres>>,
}

#[async_trait]
impl Store for PgStoreTx {
    async fn acquire_job(&self, params: AcquireJobParams) -> Result<ProvisionerJob, StoreError> {
        let mut tx = self.tx.lock().await;
        acquire_job(&mut **tx, params).await
    }

    async fn get_provisioner_job(&self, id: Uuid) -> Result<ProvisionerJob, StoreError> {
        let mut tx = self.tx.lock().await;
        get_provisioner_job(&mut **tx, id).await
    }

    async fn insert_provisioner_job(&self, job: ProvisionerJob) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        insert_provisioner_job(&mut **tx, job).await
    }

    async fn update_job(&self, id: Uuid, updated_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        update_job(&mut **tx, id, updated_at).await
    }

    async fn update_job_completed(&self, params: CompleteJobParams) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        update_job_completed(&mut **tx, params).await
    }

    async fn update_job_canceled(
        &self,
        id: Uuid,
        canceled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        update_job_canceled(&mut **tx, id, canceled_at).await
    }

    async fn insert_job_logs(
        &self,
        params: InsertJobLogsParams,
    ) -> Result<Vec<JobLog>, StoreError> {
        let mut tx = self.tx.lock().await;
        insert_job_logs(&mut **tx, params).await
    }

    async fn get_job_logs_after(
        &self,
        job_id: Uuid,
        after: i64,
    ) -> Result<Vec<JobLog>, StoreError> {
        let mut tx = self.tx.lock().await;
        get_job_logs_after(&mut **tx, job_id, after).await
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StoreError> {
        let mut tx = self.tx.lock().await;
        get_user(&mut **tx, id).await
    }

    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        insert_user(&mut **tx, user).await
    }

    async fn get_file(&self, id: Uuid) -> Result<File, StoreError> {
        let mut tx = self.tx.lock().await;
        get_file(&mut **tx, id).await
    }

    async fn insert_file(&self, file: File) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        insert_file(&mut **tx, file).await
    }

    async fn get_template(&self, id: Uuid) -> Result<Template, StoreError> {
        let mut tx = self.tx.lock().await;
        get_template(&mut **tx, id).await
    }

    async fn insert_template(&self, template: Template) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        insert_template(&mut **tx, template).await
    }

    async fn get_template_version(&self, id: Uuid) -> Result<TemplateVersion, StoreError> {
        let mut tx = self.tx.lock().await;
        get_template_version(&mut **tx, id).await
    }

    async fn get_template_version_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<TemplateVersion, StoreError> {
        let mut tx = self.tx.lock().await;
        get_template_version_by_job(&mut **tx, job_id).await
    }

    async fn insert_template_version(&self, version: TemplateVersion) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        insert_template_version(&mut **tx, version).await
    }

    async fn update_template_version_description_by_job(
        &self,
        job_id: Uuid,
        readme: String,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        update_template_version_description_by_job(&mut **tx, job_id, readme, updated_at).await
    }

    async fn get_workspace(&self, id: Uuid) -> Result<Workspace, StoreError> {
        let mut tx = self.tx.lock().await;
        get_workspace(&mut **tx, id).await
    }

    async fn insert_workspace(&self, workspace: Workspace) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        insert_workspace(&mut **tx, workspace).await
    }

    async fn update_workspace_deleted(&self, id: Uuid, deleted: bool) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        update_workspace_deleted(&mut **tx, id, deleted).await
    }

    async fn get_workspace_build(&self, id: Uuid) -> Result<WorkspaceBuild, StoreError> {
        let mut tx = self.tx.lock().await;
        get_workspace_build(&mut **tx, id).await
    }

    async fn insert_workspace_build(&self, build: WorkspaceBuild) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        insert_workspace_build(&mut **tx, build).await
    }

    async fn update_workspace_build(
        &self,
        params: UpdateWorkspaceBuildParams,
    ) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        update_workspace_build(&mut **tx, params).await
    }

    async fn insert_parameter_schema(&self, schema: ParameterSchema) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        insert_parameter_schema(&mut **tx, schema).await
    }

    async fn get_parameter_schemas_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<ParameterSchema>, StoreError> {
        let mut tx = self.tx.lock().await;
        get_parameter_schemas_by_job(&mut **tx, job_id).await
    }

    async fn insert_parameter_value(&self, value: ParameterValue) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        insert_parameter_value(&mut **tx, value).await
    }

    async fn parameter_values_by_scope(
        &self,
        scope: ParameterScope,
        scope_id: Uuid,
    ) -> Result<Vec<ParameterValue>, StoreError> {
        let mut tx = self.tx.lock().await;
        parameter_values_by_scope(&mut **tx, scope, scope_id).await
    }

    async fn insert_workspace_resource(
        &self,
        resource: WorkspaceResource,
    ) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        insert_workspace_resource(&mut **tx, resource).await
    }

    async fn get_workspace_resources_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<WorkspaceResource>, StoreError> {
        let mut tx = self.tx.lock().await;
        get_workspace_resources_by_job(&mut **tx, job_id).await
    }

    async fn insert_workspace_agent(&self, agent: WorkspaceAgent) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        insert_workspace_agent(&mut **tx, agent).await
    }

    async fn insert_workspace_app(&self, app: WorkspaceApp) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        insert_workspace_app(&mut **tx, app).await
    }

    async fn insert_workspace_resource_metadata(
        &self,
        metadatum: WorkspaceResourceMetadatum,
    ) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        insert_workspace_resource_metadata(&mut **tx, metadatum).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        Err(StoreError::NestedTransaction)
    }
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.into_inner().commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.into_inner().rollback().await?;
        Ok(())
    }
}

// =============================================================================
// Queries
// =============================================================================

const JOB_COLUMNS: &str = "id, created_at, updated_at, started_at, canceled_at, completed_at, \
                           error, initiator_id, provisioner, storage_method, file_id, job_type, \
                           input, tags, worker_id";

async fn acquire_job<'e, E>(
    executor: E,
    params: AcquireJobParams,
) -> Result<ProvisionerJob, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let types: Vec<String> = params
        .types
        .iter()
        .map(|kind| kind.as_str().to_string())
        .collect();

    // SKIP LOCKED jumps over rows other workers hold, so two racing
    // acquires never see the same job; the loser gets no row.
    let row: Option<JobRow> = sqlx::query_as(&format!(
        r#"
        UPDATE provisioner_jobs
        SET started_at = $1, updated_at = $1, worker_id = $2
        WHERE id = (
            SELECT id FROM provisioner_jobs AS nested
            WHERE nested.started_at IS NULL
              AND nested.canceled_at IS NULL
              AND nested.completed_at IS NULL
              AND nested.provisioner = ANY($3)
              AND nested.tags <@ $4
            ORDER BY nested.created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(params.started_at)
    .bind(params.worker_id)
    .bind(&types)
    .bind(&params.tags)
    .fetch_optional(executor)
    .await?;

    row.ok_or(StoreError::NoRowsAvailable)?.try_into()
}

async fn get_provisioner_job<'e, E>(executor: E, id: Uuid) -> Result<ProvisionerJob, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: Option<JobRow> =
        sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM provisioner_jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await?;
    row.ok_or_else(|| StoreError::not_found("provisioner job", id))?
        .try_into()
}

async fn insert_provisioner_job<'e, E>(executor: E, job: ProvisionerJob) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO provisioner_jobs (id, created_at, updated_at, started_at, canceled_at,
                                      completed_at, error, initiator_id, provisioner,
                                      storage_method, file_id, job_type, input, tags, worker_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(job.id)
    .bind(job.created_at)
    .bind(job.updated_at)
    .bind(job.started_at)
    .bind(job.canceled_at)
    .bind(job.completed_at)
    .bind(&job.error)
    .bind(job.initiator_id)
    .bind(job.provisioner.as_str())
    .bind(job.storage_method.as_str())
    .bind(job.file_id)
    .bind(job.job_type.as_str())
    .bind(&job.input)
    .bind(&job.tags)
    .bind(job.worker_id)
    .execute(executor)
    .await
    .map_err(insert_error)?;
    Ok(())
}

async fn update_job<'e, E>(
    executor: E,
    id: Uuid,
    updated_at: DateTime<Utc>,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query("UPDATE provisioner_jobs SET updated_at = $2 WHERE id = $1")
        .bind(id)
        .bind(updated_at)
        .execute(executor)
        .await?;
    ensure_found(result.rows_affected(), "provisioner job", id)
}

async fn update_job_completed<'e, E>(
    executor: E,
    params: CompleteJobParams,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE provisioner_jobs
        SET updated_at = $2, completed_at = $3, error = $4
        WHERE id = $1
        "#,
    )
    .bind(params.id)
    .bind(params.updated_at)
    .bind(params.completed_at)
    .bind(&params.error)
    .execute(executor)
    .await?;
    ensure_found(result.rows_affected(), "provisioner job", params.id)
}

async fn update_job_canceled<'e, E>(
    executor: E,
    id: Uuid,
    canceled_at: DateTime<Utc>,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let result =
        sqlx::query("UPDATE provisioner_jobs SET canceled_at = $2, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(canceled_at)
            .execute(executor)
            .await?;
    ensure_found(result.rows_affected(), "provisioner job", id)
}

async fn insert_job_logs<'e, E>(
    executor: E,
    params: InsertJobLogsParams,
) -> Result<Vec<JobLog>, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let source: Vec<String> = params.source.iter().map(|s| s.as_str().to_string()).collect();
    let level: Vec<String> = params.level.iter().map(|l| l.as_str().to_string()).collect();

    let rows: Vec<JobLogRow> = sqlx::query_as(
        r#"
        INSERT INTO provisioner_job_logs (job_id, created_at, source, level, stage, output)
        SELECT $1, created_at, source, level, stage, output
        FROM unnest($2::timestamptz[], $3::text[], $4::text[], $5::text[], $6::text[])
          AS t(created_at, source, level, stage, output)
        RETURNING id, job_id, created_at, source, level, stage, output
        "#,
    )
    .bind(params.job_id)
    .bind(&params.created_at)
    .bind(&source)
    .bind(&level)
    .bind(&params.stage)
    .bind(&params.output)
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

async fn get_job_logs_after<'e, E>(
    executor: E,
    job_id: Uuid,
    after: i64,
) -> Result<Vec<JobLog>, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows: Vec<JobLogRow> = sqlx::query_as(
        r#"
        SELECT id, job_id, created_at, source, level, stage, output
        FROM provisioner_job_logs
        WHERE job_id = $1 AND id > $2
        ORDER BY id ASC
        "#,
    )
    .bind(job_id)
    .bind(after)
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

async fn get_user<'e, E>(executor: E, id: Uuid) -> Result<User, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: Option<UserRow> =
        sqlx::query_as("SELECT id, created_at, username, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
    Ok(row.ok_or_else(|| StoreError::not_found("user", id))?.into())
}

async fn insert_user<'e, E>(executor: E, user: User) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query("INSERT INTO users (id, created_at, username, email) VALUES ($1, $2, $3, $4)")
        .bind(user.id)
        .bind(user.created_at)
        .bind(&user.username)
        .bind(&user.email)
        .execute(executor)
        .await
        .map_err(insert_error)?;
    Ok(())
}

async fn get_file<'e, E>(executor: E, id: Uuid) -> Result<File, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: Option<FileRow> =
        sqlx::query_as("SELECT id, created_at, mimetype, data FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
    Ok(row.ok_or_else(|| StoreError::not_found("file", id))?.into())
}

async fn insert_file<'e, E>(executor: E, file: File) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query("INSERT INTO files (id, created_at, mimetype, data) VALUES ($1, $2, $3, $4)")
        .bind(file.id)
        .bind(file.created_at)
        .bind(&file.mimetype)
        .bind(&file.data)
        .execute(executor)
        .await
        .map_err(insert_error)?;
    Ok(())
}

async fn get_template<'e, E>(executor: E, id: Uuid) -> Result<Template, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: Option<TemplateRow> = sqlx::query_as(
        "SELECT id, created_at, updated_at, name, active_version_id, created_by \
         FROM templates WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;
    Ok(row.ok_or_else(|| StoreError::not_found("template", id))?.into())
}

async fn insert_template<'e, E>(executor: E, template: Template) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO templates (id, created_at, updated_at, name, active_version_id, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(template.id)
    .bind(template.created_at)
    .bind(template.updated_at)
    .bind(&template.name)
    .bind(template.active_version_id)
    .bind(template.created_by)
    .execute(executor)
    .await
    .map_err(insert_error)?;
    Ok(())
}

const TEMPLATE_VERSION_COLUMNS: &str =
    "id, created_at, updated_at, template_id, job_id, name, readme";

async fn get_template_version<'e, E>(executor: E, id: Uuid) -> Result<TemplateVersion, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: Option<TemplateVersionRow> = sqlx::query_as(&format!(
        "SELECT {TEMPLATE_VERSION_COLUMNS} FROM template_versions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;
    Ok(row
        .ok_or_else(|| StoreError::not_found("template version", id))?
        .into())
}

async fn get_template_version_by_job<'e, E>(
    executor: E,
    job_id: Uuid,
) -> Result<TemplateVersion, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: Option<TemplateVersionRow> = sqlx::query_as(&format!(
        "SELECT {TEMPLATE_VERSION_COLUMNS} FROM template_versions WHERE job_id = $1"
    ))
    .bind(job_id)
    .fetch_optional(executor)
    .await?;
    Ok(row
        .ok_or_else(|| StoreError::not_found("template version", job_id))?
        .into())
}

async fn insert_template_version<'e, E>(
    executor: E,
    version: TemplateVersion,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO template_versions (id, created_at, updated_at, template_id, job_id, name, readme)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(version.id)
    .bind(version.created_at)
    .bind(version.updated_at)
    .bind(version.template_id)
    .bind(version.job_id)
    .bind(&version.name)
    .bind(&version.readme)
    .execute(executor)
    .await
    .map_err(insert_error)?;
    Ok(())
}

async fn update_template_version_description_by_job<'e, E>(
    executor: E,
    job_id: Uuid,
    readme: String,
    updated_at: DateTime<Utc>,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let result =
        sqlx::query("UPDATE template_versions SET readme = $2, updated_at = $3 WHERE job_id = $1")
            .bind(job_id)
            .bind(&readme)
            .bind(updated_at)
            .execute(executor)
            .await?;
    ensure_found(result.rows_affected(), "template version", job_id)
}

async fn get_workspace<'e, E>(executor: E, id: Uuid) -> Result<Workspace, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: Option<WorkspaceRow> = sqlx::query_as(
        "SELECT id, created_at, updated_at, owner_id, template_id, name, ttl_millis, deleted \
         FROM workspaces WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;
    Ok(row.ok_or_else(|| StoreError::not_found("workspace", id))?.into())
}

async fn insert_workspace<'e, E>(executor: E, workspace: Workspace) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO workspaces (id, created_at, updated_at, owner_id, template_id, name,
                                ttl_millis, deleted)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(workspace.id)
    .bind(workspace.created_at)
    .bind(workspace.updated_at)
    .bind(workspace.owner_id)
    .bind(workspace.template_id)
    .bind(&workspace.name)
    .bind(workspace.ttl_millis)
    .bind(workspace.deleted)
    .execute(executor)
    .await
    .map_err(insert_error)?;
    Ok(())
}

async fn update_workspace_deleted<'e, E>(
    executor: E,
    id: Uuid,
    deleted: bool,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query("UPDATE workspaces SET deleted = $2 WHERE id = $1")
        .bind(id)
        .bind(deleted)
        .execute(executor)
        .await?;
    ensure_found(result.rows_affected(), "workspace", id)
}

const WORKSPACE_BUILD_COLUMNS: &str =
    "id, created_at, updated_at, workspace_id, template_version_id, build_number, transition, \
     initiator_id, job_id, provisioner_state, deadline, daily_cost";

async fn get_workspace_build<'e, E>(executor: E, id: Uuid) -> Result<WorkspaceBuild, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: Option<WorkspaceBuildRow> = sqlx::query_as(&format!(
        "SELECT {WORKSPACE_BUILD_COLUMNS} FROM workspace_builds WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;
    row.ok_or_else(|| StoreError::not_found("workspace build", id))?
        .try_into()
}

async fn insert_workspace_build<'e, E>(
    executor: E,
    build: WorkspaceBuild,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO workspace_builds (id, created_at, updated_at, workspace_id,
                                      template_version_id, build_number, transition,
                                      initiator_id, job_id, provisioner_state, deadline,
                                      daily_cost)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(build.id)
    .bind(build.created_at)
    .bind(build.updated_at)
    .bind(build.workspace_id)
    .bind(build.template_version_id)
    .bind(build.build_number)
    .bind(build.transition.as_str())
    .bind(build.initiator_id)
    .bind(build.job_id)
    .bind(&build.provisioner_state)
    .bind(build.deadline)
    .bind(build.daily_cost)
    .execute(executor)
    .await
    .map_err(insert_error)?;
    Ok(())
}

async fn update_workspace_build<'e, E>(
    executor: E,
    params: UpdateWorkspaceBuildParams,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE workspace_builds
        SET updated_at = $2, provisioner_state = $3, deadline = $4
        WHERE id = $1
        "#,
    )
    .bind(params.id)
    .bind(params.updated_at)
    .bind(&params.provisioner_state)
    .bind(params.deadline)
    .execute(executor)
    .await?;
    ensure_found(result.rows_affected(), "workspace build", params.id)
}

async fn insert_parameter_schema<'e, E>(
    executor: E,
    schema: ParameterSchema,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO parameter_schemas (id, created_at, job_id, name, description,
                                       default_source_scheme, default_source_value,
                                       allow_override_source, default_destination_scheme,
                                       allow_override_destination, redisplay_value,
                                       validation_error, validation_condition,
                                       validation_type_system, validation_value_type, "index")
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(schema.id)
    .bind(schema.created_at)
    .bind(schema.job_id)
    .bind(&schema.name)
    .bind(&schema.description)
    .bind(schema.default_source_scheme.as_str())
    .bind(&schema.default_source_value)
    .bind(schema.allow_override_source)
    .bind(schema.default_destination_scheme.as_str())
    .bind(schema.allow_override_destination)
    .bind(schema.redisplay_value)
    .bind(&schema.validation_error)
    .bind(&schema.validation_condition)
    .bind(schema.validation_type_system.as_str())
    .bind(&schema.validation_value_type)
    .bind(schema.index)
    .execute(executor)
    .await
    .map_err(insert_error)?;
    Ok(())
}

async fn get_parameter_schemas_by_job<'e, E>(
    executor: E,
    job_id: Uuid,
) -> Result<Vec<ParameterSchema>, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows: Vec<ParameterSchemaRow> = sqlx::query_as(
        r#"
        SELECT id, created_at, job_id, name, description, default_source_scheme,
               default_source_value, allow_override_source, default_destination_scheme,
               allow_override_destination, redisplay_value, validation_error,
               validation_condition, validation_type_system, validation_value_type, "index"
        FROM parameter_schemas
        WHERE job_id = $1
        ORDER BY "index" ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

async fn insert_parameter_value<'e, E>(
    executor: E,
    value: ParameterValue,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO parameter_values (id, created_at, updated_at, scope, scope_id, name,
                                      source_scheme, source_value, destination_scheme)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(value.id)
    .bind(value.created_at)
    .bind(value.updated_at)
    .bind(value.scope.as_str())
    .bind(value.scope_id)
    .bind(&value.name)
    .bind(value.source_scheme.as_str())
    .bind(&value.source_value)
    .bind(value.destination_scheme.as_str())
    .execute(executor)
    .await
    .map_err(insert_error)?;
    Ok(())
}

async fn parameter_values_by_scope<'e, E>(
    executor: E,
    scope: ParameterScope,
    scope_id: Uuid,
) -> Result<Vec<ParameterValue>, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows: Vec<ParameterValueRow> = sqlx::query_as(
        r#"
        SELECT id, created_at, updated_at, scope, scope_id, name, source_scheme, source_value,
               destination_scheme
        FROM parameter_values
        WHERE scope = $1 AND scope_id = $2
        ORDER BY created_at ASC
        "#,
    )
    .bind(scope.as_str())
    .bind(scope_id)
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

async fn insert_workspace_resource<'e, E>(
    executor: E,
    resource: WorkspaceResource,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO workspace_resources (id, created_at, job_id, transition, type, name, hide,
                                         icon, instance_type, daily_cost)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(resource.id)
    .bind(resource.created_at)
    .bind(resource.job_id)
    .bind(resource.transition.as_str())
    .bind(&resource.resource_type)
    .bind(&resource.name)
    .bind(resource.hide)
    .bind(&resource.icon)
    .bind(&resource.instance_type)
    .bind(resource.daily_cost)
    .execute(executor)
    .await
    .map_err(insert_error)?;
    Ok(())
}

async fn get_workspace_resources_by_job<'e, E>(
    executor: E,
    job_id: Uuid,
) -> Result<Vec<WorkspaceResource>, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows: Vec<WorkspaceResourceRow> = sqlx::query_as(
        r#"
        SELECT id, created_at, job_id, transition, type, name, hide, icon, instance_type,
               daily_cost
        FROM workspace_resources
        WHERE job_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

async fn insert_workspace_agent<'e, E>(
    executor: E,
    agent: WorkspaceAgent,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO workspace_agents (id, created_at, updated_at, resource_id, name, auth_token,
                                      auth_instance_id, architecture, operating_system,
                                      directory, env, startup_script,
                                      connection_timeout_seconds, troubleshooting_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(agent.id)
    .bind(agent.created_at)
    .bind(agent.updated_at)
    .bind(agent.resource_id)
    .bind(&agent.name)
    .bind(agent.auth_token)
    .bind(&agent.auth_instance_id)
    .bind(&agent.architecture)
    .bind(&agent.operating_system)
    .bind(&agent.directory)
    .bind(&agent.env)
    .bind(&agent.startup_script)
    .bind(agent.connection_timeout_seconds)
    .bind(&agent.troubleshooting_url)
    .execute(executor)
    .await
    .map_err(insert_error)?;
    Ok(())
}

async fn insert_workspace_app<'e, E>(executor: E, app: WorkspaceApp) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO workspace_apps (id, created_at, agent_id, slug, display_name, icon, command,
                                    url, subdomain, sharing_level, healthcheck_url,
                                    healthcheck_interval, healthcheck_threshold, health)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(app.id)
    .bind(app.created_at)
    .bind(app.agent_id)
    .bind(&app.slug)
    .bind(&app.display_name)
    .bind(&app.icon)
    .bind(&app.command)
    .bind(&app.url)
    .bind(app.subdomain)
    .bind(app.sharing_level.as_str())
    .bind(&app.healthcheck_url)
    .bind(app.healthcheck_interval)
    .bind(app.healthcheck_threshold)
    .bind(app.health.as_str())
    .execute(executor)
    .await
    .map_err(insert_error)?;
    Ok(())
}

async fn insert_workspace_resource_metadata<'e, E>(
    executor: E,
    metadatum: WorkspaceResourceMetadatum,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO workspace_resource_metadata (workspace_resource_id, key, value, sensitive)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(metadatum.workspace_resource_id)
    .bind(&metadatum.key)
    .bind(&metadatum.value)
    .bind(metadatum.sensitive)
    .execute(executor)
    .await
    .map_err(insert_error)?;
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::UniqueViolation(db.message().to_string());
        }
    }
    StoreError::Database(err)
}

fn ensure_found(rows_affected: u64, entity: &'static str, id: Uuid) -> Result<(), StoreError> {
    if rows_affected == 0 {
        return Err(StoreError::not_found(entity, id));
    }
    Ok(())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
    initiator_id: Uuid,
    provisioner: String,
    storage_method: String,
    file_id: Uuid,
    job_type: String,
    input: serde_json::Value,
    tags: serde_json::Value,
    worker_id: Option<Uuid>,
}

impl TryFrom<JobRow> for ProvisionerJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(ProvisionerJob {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            canceled_at: row.canceled_at,
            completed_at: row.completed_at,
            error: row.error,
            initiator_id: row.initiator_id,
            provisioner: row.provisioner.parse()?,
            storage_method: row.storage_method.parse()?,
            file_id: row.file_id,
            job_type: row.job_type.parse()?,
            input: row.input,
            tags: row.tags,
            worker_id: row.worker_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobLogRow {
    id: i64,
    job_id: Uuid,
    created_at: DateTime<Utc>,
    source: String,
    level: String,
    stage: String,
    output: String,
}

impl TryFrom<JobLogRow> for JobLog {
    type Error = StoreError;

    fn try_from(row: JobLogRow) -> Result<Self, Self::Error> {
        Ok(JobLog {
            id: row.id,
            job_id: row.job_id,
            created_at: row.created_at,
            source: row.source.parse()?,
            level: row.level.parse()?,
            stage: row.stage,
            output: row.output,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    username: String,
    email: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            created_at: row.created_at,
            username: row.username,
            email: row.email,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    mimetype: String,
    data: Vec<u8>,
}

impl From<FileRow> for File {
    fn from(row: FileRow) -> Self {
        File {
            id: row.id,
            created_at: row.created_at,
            mimetype: row.mimetype,
            data: row.data,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    name: String,
    active_version_id: Option<Uuid>,
    created_by: Uuid,
}

impl From<TemplateRow> for Template {
    fn from(row: TemplateRow) -> Self {
        Template {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            name: row.name,
            active_version_id: row.active_version_id,
            created_by: row.created_by,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TemplateVersionRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    template_id: Option<Uuid>,
    job_id: Uuid,
    name: String,
    readme: String,
}

impl From<TemplateVersionRow> for TemplateVersion {
    fn from(row: TemplateVersionRow) -> Self {
        TemplateVersion {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            template_id: row.template_id,
            job_id: row.job_id,
            name: row.name,
            readme: row.readme,
        }
    }
}

#[derive(sqlx::FromRow)]
struct WorkspaceRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    owner_id: Uuid,
    template_id: Uuid,
    name: String,
    ttl_millis: Option<i64>,
    deleted: bool,
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        Workspace {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            owner_id: row.owner_id,
            template_id: row.template_id,
            name: row.name,
            ttl_millis: row.ttl_millis,
            deleted: row.deleted,
        }
    }
}

#[derive(sqlx::FromRow)]
struct WorkspaceBuildRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    workspace_id: Uuid,
    template_version_id: Uuid,
    build_number: i32,
    transition: String,
    initiator_id: Uuid,
    job_id: Uuid,
    provisioner_state: Vec<u8>,
    deadline: Option<DateTime<Utc>>,
    daily_cost: i32,
}

impl TryFrom<WorkspaceBuildRow> for WorkspaceBuild {
    type Error = StoreError;

    fn try_from(row: WorkspaceBuildRow) -> Result<Self, Self::Error> {
        Ok(WorkspaceBuild {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            workspace_id: row.workspace_id,
            template_version_id: row.template_version_id,
            build_number: row.build_number,
            transition: row.transition.parse()?,
            initiator_id: row.initiator_id,
            job_id: row.job_id,
            provisioner_state: row.provisioner_state,
            deadline: row.deadline,
            daily_cost: row.daily_cost,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ParameterSchemaRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    job_id: Uuid,
    name: String,
    description: String,
    default_source_scheme: String,
    default_source_value: String,
    allow_override_source: bool,
    default_destination_scheme: String,
    allow_override_destination: bool,
    redisplay_value: bool,
    validation_error: String,
    validation_condition: String,
    validation_type_system: String,
    validation_value_type: String,
    index: i32,
}

impl TryFrom<ParameterSchemaRow> for ParameterSchema {
    type Error = StoreError;

    fn try_from(row: ParameterSchemaRow) -> Result<Self, Self::Error> {
        Ok(ParameterSchema {
            id: row.id,
            created_at: row.created_at,
            job_id: row.job_id,
            name: row.name,
            description: row.description,
            default_source_scheme: row.default_source_scheme.parse()?,
            default_source_value: row.default_source_value,
            allow_override_source: row.allow_override_source,
            default_destination_scheme: row.default_destination_scheme.parse()?,
            allow_override_destination: row.allow_override_destination,
            redisplay_value: row.redisplay_value,
            validation_error: row.validation_error,
            validation_condition: row.validation_condition,
            validation_type_system: row.validation_type_system.parse()?,
            validation_value_type: row.validation_value_type,
            index: row.index,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ParameterValueRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    scope: String,
    scope_id: Uuid,
    name: String,
    source_scheme: String,
    source_value: String,
    destination_scheme: String,
}

impl TryFrom<ParameterValueRow> for ParameterValue {
    type Error = StoreError;

    fn try_from(row: ParameterValueRow) -> Result<Self, Self::Error> {
        Ok(ParameterValue {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            scope: row.scope.parse()?,
            scope_id: row.scope_id,
            name: row.name,
            source_scheme: row.source_scheme.parse()?,
            source_value: row.source_value,
            destination_scheme: row.destination_scheme.parse()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WorkspaceResourceRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    job_id: Uuid,
    transition: String,
    #[sqlx(rename = "type")]
    resource_type: String,
    name: String,
    hide: bool,
    icon: String,
    instance_type: Option<String>,
    daily_cost: i32,
}

impl TryFrom<WorkspaceResourceRow> for WorkspaceResource {
    type Error = StoreError;

    fn try_from(row: WorkspaceResourceRow) -> Result<Self, Self::Error> {
        Ok(WorkspaceResource {
            id: row.id,
            created_at: row.created_at,
            job_id: row.job_id,
            transition: row.transition.parse()?,
            resource_type: row.resource_type,
            name: row.name,
            hide: row.hide,
            icon: row.icon,
            instance_type: row.instance_type,
            daily_cost: row.daily_cost,
        })
    }
}
