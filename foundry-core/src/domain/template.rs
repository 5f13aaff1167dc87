//! Template domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A provisioning template workspaces are built from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub name: String,
    pub active_version_id: Option<Uuid>,
    pub created_by: Uuid,
}

/// One imported version of a template
///
/// The import job that produced the version pins its parameter schemas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVersion {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Unset while a version is being imported for a template that doesn't
    /// exist yet.
    pub template_id: Option<Uuid>,
    pub job_id: Uuid,
    pub name: String,
    pub readme: String,
}

/// A stored source archive referenced by a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub mimetype: String,
    pub data: Vec<u8>,
}
