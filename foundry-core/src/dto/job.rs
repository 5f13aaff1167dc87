//! Job lifecycle DTOs
//!
//! Requests and responses for the acquire/update/fail/complete RPC surface.

use serde::{Deserialize, Serialize};

use crate::dto::parameter::{ParameterSchema, ParameterValue};
use crate::dto::resource::Resource;

/// A job handed to a provisioner daemon.
///
/// An all-default value is the "empty envelope": no work is available and
/// the daemon should poll again later.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcquiredJob {
    #[serde(default)]
    pub job_id: String,
    /// Unix milliseconds.
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub provisioner: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub template_source_archive: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AcquiredJobKind>,
}

impl AcquiredJob {
    /// The envelope returned when no job is available.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.job_id.is_empty()
    }
}

/// Type-specific payload of an acquired job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AcquiredJobKind {
    WorkspaceBuild(WorkspaceBuildJob),
    TemplateImport(TemplateImportJob),
    TemplateDryRun(TemplateDryRunJob),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceBuildJob {
    pub workspace_build_id: String,
    pub workspace_name: String,
    /// Provisioner state carried over from the previous build.
    #[serde(default)]
    pub state: Vec<u8>,
    #[serde(default)]
    pub parameter_values: Vec<ParameterValue>,
    pub metadata: ProvisionMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateImportJob {
    pub metadata: ProvisionMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDryRunJob {
    #[serde(default)]
    pub parameter_values: Vec<ParameterValue>,
    pub metadata: ProvisionMetadata,
}

/// Context handed to the provisioner alongside the source archive
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionMetadata {
    pub access_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_transition: Option<Transition>,
    #[serde(default)]
    pub workspace_name: String,
    #[serde(default)]
    pub workspace_owner: String,
    #[serde(default)]
    pub workspace_owner_email: String,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub workspace_owner_id: String,
}

/// Workspace transition as the provisioner protocol names it.
///
/// Note the storage model calls the teardown transition `delete`; the wire
/// protocol calls it `destroy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Start,
    Stop,
    Destroy,
}

/// Incremental progress report from a daemon
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateJobRequest {
    pub job_id: String,
    #[serde(default)]
    pub logs: Vec<Log>,
    #[serde(default)]
    pub readme: Option<String>,
    #[serde(default)]
    pub parameter_schemas: Vec<ParameterSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateJobResponse {
    /// Set when the job was canceled; the daemon aborts cooperatively.
    pub canceled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameter_values: Vec<ParameterValue>,
}

/// One log line in an update batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    /// Unix milliseconds.
    pub created_at: i64,
    pub source: LogSource,
    pub level: LogLevel,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    ProvisionerDaemon,
    Provisioner,
}

/// Terminal failure report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJob {
    pub job_id: String,
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailedJobKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailedJobKind {
    WorkspaceBuild(FailedWorkspaceBuild),
    TemplateImport(FailedTemplateImport),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailedWorkspaceBuild {
    /// Provisioner state at the point of failure, when the worker captured
    /// one. The build deadline is never touched on failure.
    #[serde(default)]
    pub state: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailedTemplateImport {}

/// Terminal success report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedJob {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<CompletedJobKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletedJobKind {
    WorkspaceBuild(CompletedWorkspaceBuild),
    TemplateImport(CompletedTemplateImport),
    TemplateDryRun(CompletedTemplateDryRun),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletedWorkspaceBuild {
    #[serde(default)]
    pub state: Vec<u8>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletedTemplateImport {
    #[serde(default)]
    pub start_resources: Vec<Resource>,
    #[serde(default)]
    pub stop_resources: Vec<Resource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletedTemplateDryRun {
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// Quota commit request forwarded to the installed committer, if any
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitQuotaRequest {
    pub job_id: String,
    #[serde(default)]
    pub daily_cost: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitQuotaResponse {
    pub ok: bool,
    pub budget: i64,
}
