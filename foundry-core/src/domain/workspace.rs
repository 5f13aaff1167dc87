//! Workspace domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's workspace, built from a template version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub owner_id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    /// Time-to-live used to derive a build deadline on completion.
    pub ttl_millis: Option<i64>,
    pub deleted: bool,
}

/// One transition of a workspace
///
/// Mutated only by the terminator on the owning job's completion or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceBuild {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub workspace_id: Uuid,
    pub template_version_id: Uuid,
    pub build_number: i32,
    pub transition: WorkspaceTransition,
    pub initiator_id: Uuid,
    pub job_id: Uuid,
    /// Opaque provisioner state blob carried between builds.
    pub provisioner_state: Vec<u8>,
    pub deadline: Option<chrono::DateTime<chrono::Utc>>,
    pub daily_cost: i32,
}

/// Direction of a workspace build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceTransition {
    Start,
    Stop,
    Delete,
}
