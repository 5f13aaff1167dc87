//! Store contract
//!
//! Abstract persistence for the dispatch engine. The engine is written
//! against this trait; the Postgres backend is the production store and the
//! in-memory backend drives the test suite.

pub mod memory;
pub mod postgres;

pub use self::memory::InMemoryStore;
pub use self::postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use foundry_core::codec::CodecError;
use foundry_core::domain::job::{JobLog, LogLevel, LogSource, ProvisionerJob, ProvisionerKind};
use foundry_core::domain::parameter::{ParameterScope, ParameterSchema, ParameterValue};
use foundry_core::domain::resource::{
    WorkspaceAgent, WorkspaceApp, WorkspaceResource, WorkspaceResourceMetadatum,
};
use foundry_core::domain::template::{File, Template, TemplateVersion};
use foundry_core::domain::user::User;
use foundry_core::domain::workspace::{Workspace, WorkspaceBuild};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No unowned job matched an acquire. Not a failure; callers engage
    /// their debounce instead of propagating it.
    #[error("no rows available")]
    NoRowsAvailable,
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("transactions cannot be nested")]
    NestedTransaction,
    #[error("corrupt row: {0}")]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

/// Arguments to the row-locking acquire.
#[derive(Debug, Clone)]
pub struct AcquireJobParams {
    pub started_at: DateTime<Utc>,
    pub worker_id: Uuid,
    /// Provisioner kinds this worker can execute.
    pub types: Vec<ProvisionerKind>,
    /// A job is eligible when its tags are a subset of these.
    pub tags: serde_json::Value,
}

/// Terminal stamp for a job.
#[derive(Debug, Clone)]
pub struct CompleteJobParams {
    pub id: Uuid,
    pub updated_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// Bulk log insert; the arrays are parallel.
#[derive(Debug, Clone, Default)]
pub struct InsertJobLogsParams {
    pub job_id: Uuid,
    pub created_at: Vec<DateTime<Utc>>,
    pub source: Vec<LogSource>,
    pub level: Vec<LogLevel>,
    pub stage: Vec<String>,
    pub output: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateWorkspaceBuildParams {
    pub id: Uuid,
    pub updated_at: DateTime<Utc>,
    pub provisioner_state: Vec<u8>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Abstract persistence surface of the dispatch engine.
///
/// Implementations serialize competing acquires themselves; everything else
/// is plain CRUD. `begin` opens the transactional scope terminal writes run
/// in.
#[async_trait]
pub trait Store: Send + Sync {
    /// Atomically locks the oldest unowned, non-terminal job matching the
    /// worker's provisioner types and tag filter, stamping `worker_id` and
    /// `started_at`. Fails with [`StoreError::NoRowsAvailable`] when
    /// nothing matches.
    async fn acquire_job(&self, params: AcquireJobParams) -> Result<ProvisionerJob, StoreError>;

    async fn get_provisioner_job(&self, id: Uuid) -> Result<ProvisionerJob, StoreError>;
    async fn insert_provisioner_job(&self, job: ProvisionerJob) -> Result<(), StoreError>;
    async fn update_job(&self, id: Uuid, updated_at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn update_job_completed(&self, params: CompleteJobParams) -> Result<(), StoreError>;
    async fn update_job_canceled(
        &self,
        id: Uuid,
        canceled_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Inserts a batch of logs, returning them with their assigned ids in
    /// insertion order.
    async fn insert_job_logs(&self, params: InsertJobLogsParams)
        -> Result<Vec<JobLog>, StoreError>;
    /// Logs with ids strictly greater than `after`, in id order.
    async fn get_job_logs_after(&self, job_id: Uuid, after: i64)
        -> Result<Vec<JobLog>, StoreError>;

    async fn get_user(&self, id: Uuid) -> Result<User, StoreError>;
    async fn insert_user(&self, user: User) -> Result<(), StoreError>;

    async fn get_file(&self, id: Uuid) -> Result<File, StoreError>;
    async fn insert_file(&self, file: File) -> Result<(), StoreError>;

    async fn get_template(&self, id: Uuid) -> Result<Template, StoreError>;
    async fn insert_template(&self, template: Template) -> Result<(), StoreError>;

    async fn get_template_version(&self, id: Uuid) -> Result<TemplateVersion, StoreError>;
    async fn get_template_version_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<TemplateVersion, StoreError>;
    async fn insert_template_version(&self, version: TemplateVersion) -> Result<(), StoreError>;
    async fn update_template_version_description_by_job(
        &self,
        job_id: Uuid,
        readme: String,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn get_workspace(&self, id: Uuid) -> Result<Workspace, StoreError>;
    async fn insert_workspace(&self, workspace: Workspace) -> Result<(), StoreError>;
    async fn update_workspace_deleted(&self, id: Uuid, deleted: bool) -> Result<(), StoreError>;

    async fn get_workspace_build(&self, id: Uuid) -> Result<WorkspaceBuild, StoreError>;
    async fn insert_workspace_build(&self, build: WorkspaceBuild) -> Result<(), StoreError>;
    async fn update_workspace_build(
        &self,
        params: UpdateWorkspaceBuildParams,
    ) -> Result<(), StoreError>;

    async fn insert_parameter_schema(&self, schema: ParameterSchema) -> Result<(), StoreError>;
    /// Schemas pinned to a job, ordered by their reported index.
    async fn get_parameter_schemas_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<ParameterSchema>, StoreError>;
    async fn insert_parameter_value(&self, value: ParameterValue) -> Result<(), StoreError>;
    async fn parameter_values_by_scope(
        &self,
        scope: ParameterScope,
        scope_id: Uuid,
    ) -> Result<Vec<ParameterValue>, StoreError>;

    async fn insert_workspace_resource(
        &self,
        resource: WorkspaceResource,
    ) -> Result<(), StoreError>;
    async fn get_workspace_resources_by_job(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<WorkspaceResource>, StoreError>;
    async fn insert_workspace_agent(&self, agent: WorkspaceAgent) -> Result<(), StoreError>;
    async fn insert_workspace_app(&self, app: WorkspaceApp) -> Result<(), StoreError>;
    async fn insert_workspace_resource_metadata(
        &self,
        metadatum: WorkspaceResourceMetadatum,
    ) -> Result<(), StoreError>;

    /// Opens a transaction. Writes through the returned view are invisible
    /// until [`StoreTx::commit`]; dropping the view without committing
    /// rolls everything back.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;
}

/// A transactional view of the store.
#[async_trait]
pub trait StoreTx: Store {
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
