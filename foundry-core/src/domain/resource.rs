//! Workspace resource domain types
//!
//! The normalized resource subtree persisted after a job completes:
//! a resource owns agents and metadata, an agent owns apps.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::workspace::WorkspaceTransition;

/// An infrastructure resource reported by a completed job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceResource {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub job_id: Uuid,
    pub transition: WorkspaceTransition,
    pub resource_type: String,
    pub name: String,
    pub hide: bool,
    pub icon: String,
    pub instance_type: Option<String>,
    pub daily_cost: i32,
}

/// An agent running inside a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceAgent {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub resource_id: Uuid,
    pub name: String,
    /// Token authentication. Minted by the materializer unless the worker
    /// supplied one.
    pub auth_token: Uuid,
    /// Instance-identity authentication. Mutually exclusive with an explicit
    /// token; the token form wins if both were reported.
    pub auth_instance_id: Option<String>,
    pub architecture: String,
    pub operating_system: String,
    pub directory: String,
    /// Environment variables marshaled to a JSON blob, if any were reported.
    pub env: Option<serde_json::Value>,
    pub startup_script: Option<String>,
    pub connection_timeout_seconds: i32,
    pub troubleshooting_url: String,
}

/// An application exposed by an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceApp {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub agent_id: Uuid,
    /// URL-safe identifier, unique within one build/import/dry-run.
    pub slug: String,
    pub display_name: String,
    pub icon: String,
    pub command: Option<String>,
    pub url: Option<String>,
    pub subdomain: bool,
    pub sharing_level: AppSharingLevel,
    pub healthcheck_url: String,
    pub healthcheck_interval: i32,
    pub healthcheck_threshold: i32,
    pub health: AppHealth,
}

/// A key/value annotation attached to a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceResourceMetadatum {
    pub id: i64,
    pub workspace_resource_id: Uuid,
    pub key: String,
    /// Absent iff the reported item was null.
    pub value: Option<String>,
    pub sensitive: bool,
}

/// Who may open an app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppSharingLevel {
    Owner,
    Authenticated,
    Public,
}

/// Health of an app as tracked by its healthcheck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppHealth {
    Disabled,
    Initializing,
    Healthy,
    Unhealthy,
}
