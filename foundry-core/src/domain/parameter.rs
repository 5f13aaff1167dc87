//! Parameter domain types
//!
//! Schemas are pinned to the import job that reported them; values are
//! attached to a scope and resolved by the parameter resolver.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A parameter declared by a template import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub job_id: Uuid,
    pub name: String,
    pub description: String,
    pub default_source_scheme: ParameterSourceScheme,
    pub default_source_value: String,
    pub allow_override_source: bool,
    pub default_destination_scheme: ParameterDestinationScheme,
    pub allow_override_destination: bool,
    pub redisplay_value: bool,
    pub validation_error: String,
    pub validation_condition: String,
    pub validation_type_system: ParameterTypeSystem,
    pub validation_value_type: String,
    /// Position within the batch the worker reported.
    pub index: i32,
}

/// A concrete parameter value attached to a scope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterValue {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub scope: ParameterScope,
    pub scope_id: Uuid,
    pub name: String,
    pub source_scheme: ParameterSourceScheme,
    pub source_value: String,
    pub destination_scheme: ParameterDestinationScheme,
}

/// What entity a parameter value is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterScope {
    Template,
    ImportJob,
    Workspace,
}

/// How a parameter value is sourced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSourceScheme {
    None,
    Data,
}

/// How a parameter value is delivered to the provisioner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDestinationScheme {
    None,
    EnvironmentVariable,
    ProvisionerVariable,
}

/// Type system used to validate a parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterTypeSystem {
    None,
    Hcl,
}
