//! Parameter DTOs

use serde::{Deserialize, Serialize};

/// A resolved parameter value handed to the provisioner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterValue {
    pub destination_scheme: ParameterDestinationScheme,
    pub name: String,
    pub value: String,
}

/// A parameter declaration reported by a template import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_source: Option<ParameterSource>,
    #[serde(default)]
    pub allow_override_source: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_destination: Option<ParameterDestination>,
    #[serde(default)]
    pub allow_override_destination: bool,
    #[serde(default)]
    pub redisplay_value: bool,
    #[serde(default)]
    pub validation_error: String,
    #[serde(default)]
    pub validation_condition: String,
    #[serde(default = "ParameterTypeSystem::none")]
    pub validation_type_system: ParameterTypeSystem,
    #[serde(default)]
    pub validation_value_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSource {
    pub scheme: ParameterSourceScheme,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDestination {
    pub scheme: ParameterDestinationScheme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSourceScheme {
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDestinationScheme {
    EnvironmentVariable,
    ProvisionerVariable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterTypeSystem {
    None,
    Hcl,
}

impl ParameterTypeSystem {
    fn none() -> Self {
        Self::None
    }
}
