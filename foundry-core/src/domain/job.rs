//! Provisioner job domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of provisioning work.
///
/// Jobs are enqueued unowned, locked by exactly one server instance on
/// acquire, and reach a terminal state exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerJob {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub canceled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
    pub initiator_id: Uuid,
    pub provisioner: ProvisionerKind,
    pub storage_method: StorageMethod,
    pub file_id: Uuid,
    pub job_type: JobType,
    /// Opaque JSON payload whose shape depends on `job_type`.
    pub input: serde_json::Value,
    pub tags: serde_json::Value,
    pub worker_id: Option<Uuid>,
}

impl ProvisionerJob {
    /// A job is terminal once `completed_at` is stamped. Terminal jobs are
    /// immutable through this engine.
    pub fn is_terminal(&self) -> bool {
        self.completed_at.is_some()
    }

    /// A job is owned once a worker has locked it.
    pub fn is_owned(&self) -> bool {
        self.worker_id.is_some()
    }
}

/// Kind of work a job represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    WorkspaceBuild,
    TemplateVersionImport,
    TemplateVersionDryRun,
}

/// Provisioner implementation that can execute a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionerKind {
    Terraform,
    Echo,
}

/// Where the job's source archive is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMethod {
    File,
}

/// A persisted log line produced during job execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLog {
    /// Monotonic id assigned by the store; subscribers resume from it.
    pub id: i64,
    pub job_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub source: LogSource,
    pub level: LogLevel,
    pub stage: String,
    pub output: String,
}

/// Severity of a job log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Which half of the worker produced a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    ProvisionerDaemon,
    Provisioner,
}
