//! Resource subtree DTOs
//!
//! The normalized form the converter emits and the materializer consumes:
//! a resource carrying its agents, apps, and metadata.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An infrastructure resource reported by a provisioner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub metadata: Vec<ResourceMetadata>,
    #[serde(default)]
    pub hide: bool,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub daily_cost: i32,
}

/// An agent attached to a resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Agent {
    /// Identifier the template assigned, used to associate apps and
    /// instance bindings. Not the persisted row id.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub startup_script: String,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub directory: String,
    #[serde(default)]
    pub connection_timeout_seconds: i32,
    #[serde(default)]
    pub troubleshooting_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AgentAuth>,
    #[serde(default)]
    pub apps: Vec<App>,
}

impl Agent {
    /// The explicit token, when token auth was reported.
    pub fn token(&self) -> Option<&str> {
        match &self.auth {
            Some(AgentAuth::Token(token)) if !token.is_empty() => Some(token),
            _ => None,
        }
    }

    /// The instance id, when instance-identity auth was reported.
    pub fn instance_id(&self) -> Option<&str> {
        match &self.auth {
            Some(AgentAuth::InstanceId(id)) if !id.is_empty() => Some(id),
            _ => None,
        }
    }
}

/// Exactly one authentication method per agent.
///
/// The token form wins if a template reports both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "value", rename_all = "snake_case")]
pub enum AgentAuth {
    Token(String),
    InstanceId(String),
}

/// An application exposed by an agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct App {
    pub slug: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub subdomain: bool,
    #[serde(default)]
    pub sharing_level: AppSharingLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<Healthcheck>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppSharingLevel {
    Owner,
    Authenticated,
    Public,
}

impl Default for AppSharingLevel {
    fn default() -> Self {
        Self::Owner
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Healthcheck {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub interval: i32,
    #[serde(default)]
    pub threshold: i32,
}

/// A key/value annotation attached to a resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub is_null: bool,
}
