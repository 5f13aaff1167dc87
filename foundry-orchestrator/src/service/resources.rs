//! Resource materialization
//!
//! Persists one reported resource subtree: the resource row, its agents,
//! their apps, and its metadata. App slugs are checked against the shared
//! per-completion set so uniqueness holds across the whole build.

use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use foundry_core::codec;
use foundry_core::domain::resource::{
    AppHealth, WorkspaceAgent, WorkspaceApp, WorkspaceResource, WorkspaceResourceMetadatum,
};
use foundry_core::domain::workspace::WorkspaceTransition;
use foundry_core::dto::resource::Resource;
use foundry_core::slug;

use crate::service::JobError;
use crate::store::Store;

/// Inserts one resource with its agents, apps, and metadata through the
/// given store view (plain store or open transaction).
pub(crate) async fn insert_workspace_resource(
    db: &dyn Store,
    job_id: Uuid,
    transition: WorkspaceTransition,
    resource: &Resource,
    app_slugs: &mut HashSet<String>,
) -> Result<(), JobError> {
    let resource_id = Uuid::new_v4();
    db.insert_workspace_resource(WorkspaceResource {
        id: resource_id,
        created_at: Utc::now(),
        job_id,
        transition,
        resource_type: resource.resource_type.clone(),
        name: resource.name.clone(),
        hide: resource.hide,
        icon: resource.icon.clone(),
        instance_type: Some(resource.instance_type.clone())
            .filter(|instance_type| !instance_type.is_empty()),
        daily_cost: resource.daily_cost,
    })
    .await?;

    for agent in &resource.agents {
        // A worker-supplied token must be a UUID; otherwise mint one.
        let auth_token = match agent.token() {
            Some(token) => Uuid::parse_str(token).map_err(JobError::InvalidAuthToken)?,
            None => Uuid::new_v4(),
        };
        let env = if agent.env.is_empty() {
            None
        } else {
            Some(
                serde_json::to_value(&agent.env)
                    .map_err(|err| JobError::Protocol(format!("marshal agent env: {err}")))?,
            )
        };

        let agent_id = Uuid::new_v4();
        db.insert_workspace_agent(WorkspaceAgent {
            id: agent_id,
            created_at: Utc::now(),
            updated_at: None,
            resource_id,
            name: agent.name.clone(),
            auth_token,
            auth_instance_id: agent.instance_id().map(str::to_string),
            architecture: agent.architecture.clone(),
            operating_system: agent.operating_system.clone(),
            directory: agent.directory.clone(),
            env,
            startup_script: Some(agent.startup_script.clone())
                .filter(|script| !script.is_empty()),
            connection_timeout_seconds: agent.connection_timeout_seconds,
            troubleshooting_url: agent.troubleshooting_url.clone(),
        })
        .await?;

        for app in &agent.apps {
            if app.slug.is_empty() {
                return Err(JobError::Protocol(
                    "app must have a slug or name set".to_string(),
                ));
            }
            if !slug::is_valid_app_slug(&app.slug) {
                return Err(JobError::InvalidSlug(app.slug.clone()));
            }
            if !app_slugs.insert(app.slug.clone()) {
                return Err(JobError::DuplicateSlug(app.slug.clone()));
            }

            let healthcheck = app.healthcheck.clone().unwrap_or_default();
            let health = if healthcheck.url.is_empty() {
                AppHealth::Disabled
            } else {
                AppHealth::Initializing
            };

            db.insert_workspace_app(WorkspaceApp {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
                agent_id,
                slug: app.slug.clone(),
                display_name: app.display_name.clone(),
                icon: app.icon.clone(),
                command: Some(app.command.clone()).filter(|command| !command.is_empty()),
                url: Some(app.url.clone()).filter(|url| !url.is_empty()),
                subdomain: app.subdomain,
                sharing_level: codec::app_sharing_level_from_wire(app.sharing_level),
                healthcheck_url: healthcheck.url,
                healthcheck_interval: healthcheck.interval,
                healthcheck_threshold: healthcheck.threshold,
                health,
            })
            .await?;
        }
    }

    for metadatum in &resource.metadata {
        let value = if metadatum.is_null {
            None
        } else {
            Some(metadatum.value.clone())
        };
        db.insert_workspace_resource_metadata(WorkspaceResourceMetadatum {
            // Assigned by the store.
            id: 0,
            workspace_resource_id: resource_id,
            key: metadatum.key.clone(),
            value,
            sensitive: metadatum.sensitive,
        })
        .await?;
    }

    Ok(())
}
