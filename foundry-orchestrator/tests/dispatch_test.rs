//! Acquire and update scenarios for the dispatch engine.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use foundry_core::dto::job::{
    AcquiredJobKind, CommitQuotaRequest, CommitQuotaResponse, Log, LogLevel, LogSource,
    Transition, UpdateJobRequest,
};
use foundry_core::dto::parameter::{
    ParameterDestination, ParameterDestinationScheme, ParameterSchema, ParameterSource,
    ParameterSourceScheme, ParameterTypeSystem,
};
use foundry_core::domain::workspace::WorkspaceTransition;
use foundry_orchestrator::pubsub::Pubsub;
use foundry_orchestrator::service::{job_logs_channel, workspace_channel, JobError};
use foundry_orchestrator::store::{InsertJobLogsParams, Store};

use common::*;

fn update_request(job_id: String) -> UpdateJobRequest {
    UpdateJobRequest {
        job_id,
        logs: Vec::new(),
        readme: None,
        parameter_schemas: Vec::new(),
    }
}

#[tokio::test]
async fn empty_acquire_debounces_store_queries() {
    let harness = harness_with_debounce(Duration::from_secs(60));

    let first = harness.server.acquire_job().await.unwrap();
    assert!(first.is_empty());
    assert_eq!(harness.store.acquire_count(), 1);

    // Within the debounce interval the store must not be queried again.
    let second = harness.server.acquire_job().await.unwrap();
    assert!(second.is_empty());
    assert_eq!(harness.store.acquire_count(), 1);
}

#[tokio::test]
async fn zero_debounce_always_queries() {
    let harness = harness();
    harness.server.acquire_job().await.unwrap();
    harness.server.acquire_job().await.unwrap();
    assert_eq!(harness.store.acquire_count(), 2);
}

#[tokio::test]
async fn acquire_locks_and_hydrates_workspace_build() {
    let harness = harness();
    let fixture = seed_workspace_build_job(
        &harness.store,
        WorkspaceTransition::Start,
        None,
    )
    .await;
    let mut workspace_events = harness
        .pubsub
        .subscribe(&workspace_channel(fixture.workspace.id))
        .await
        .unwrap();

    let acquired = harness.server.acquire_job().await.unwrap();
    assert_eq!(acquired.job_id, fixture.job.id.to_string());
    assert_eq!(acquired.provisioner, "terraform");
    assert_eq!(acquired.user_name, fixture.owner.username);
    assert_eq!(acquired.template_source_archive, fixture.file.data);

    let Some(AcquiredJobKind::WorkspaceBuild(build_job)) = acquired.kind else {
        panic!("expected a workspace build payload");
    };
    assert_eq!(build_job.workspace_build_id, fixture.build.id.to_string());
    assert_eq!(build_job.workspace_name, "dev");
    assert_eq!(build_job.state, b"prior-state");
    assert_eq!(
        build_job.metadata.workspace_transition,
        Some(Transition::Start)
    );
    assert_eq!(build_job.metadata.workspace_owner, fixture.owner.username);
    assert_eq!(
        build_job.metadata.access_url,
        "https://foundry.example.com"
    );

    // The row is stamped with this server's identity.
    let job = harness
        .store
        .get_provisioner_job(fixture.job.id)
        .await
        .unwrap();
    assert_eq!(job.worker_id, Some(harness.server.id()));
    assert!(job.started_at.is_some());

    // Hydration announces the workspace so subscribers re-fetch it.
    assert_eq!(drain(&mut workspace_events).len(), 1);
}

#[tokio::test]
async fn delete_transition_crosses_the_wire_as_destroy() {
    let harness = harness();
    seed_workspace_build_job(&harness.store, WorkspaceTransition::Delete, None).await;

    let acquired = harness.server.acquire_job().await.unwrap();
    let Some(AcquiredJobKind::WorkspaceBuild(build_job)) = acquired.kind else {
        panic!("expected a workspace build payload");
    };
    assert_eq!(
        build_job.metadata.workspace_transition,
        Some(Transition::Destroy)
    );
}

#[tokio::test]
async fn unhydratable_job_is_invalidated() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    // Corrupt the queue with a build job pointing at a missing build.
    let mut broken = fixture.job.clone();
    broken.id = uuid::Uuid::new_v4();
    broken.created_at = fixture.job.created_at - chrono::Duration::seconds(1);
    broken.job_type = foundry_core::domain::job::JobType::WorkspaceBuild;
    broken.input = json!({ "workspace_build_id": uuid::Uuid::new_v4(), "dry_run": false });
    harness.store.insert_provisioner_job(broken.clone()).await.unwrap();

    let err = harness.server.acquire_job().await.unwrap_err();
    assert!(matches!(err, JobError::Invalidated(_)));

    // The job is terminal with the hydration error so it can't be
    // re-acquired forever.
    let job = harness.store.get_provisioner_job(broken.id).await.unwrap();
    assert!(job.completed_at.is_some());
    assert!(job.error.unwrap().contains("not found"));

    // The healthy job is still acquirable afterwards.
    let acquired = harness.server.acquire_job().await.unwrap();
    assert_eq!(acquired.job_id, fixture.job.id.to_string());
}

#[tokio::test]
async fn competing_acquires_never_share_a_job() {
    let harness = harness();
    for _ in 0..4 {
        seed_import_job(&harness.store).await;
    }
    let sibling = harness.sibling_server();

    let mut acquired_ids = Vec::new();
    let (a, b) = tokio::join!(harness.server.acquire_job(), sibling.acquire_job());
    acquired_ids.push(a.unwrap().job_id);
    acquired_ids.push(b.unwrap().job_id);
    let (c, d) = tokio::join!(harness.server.acquire_job(), sibling.acquire_job());
    acquired_ids.push(c.unwrap().job_id);
    acquired_ids.push(d.unwrap().job_id);

    acquired_ids.retain(|id| !id.is_empty());
    let unique: std::collections::HashSet<_> = acquired_ids.iter().collect();
    assert_eq!(unique.len(), acquired_ids.len());
    assert_eq!(unique.len(), 4);

    // The queue is drained.
    assert!(harness.server.acquire_job().await.unwrap().is_empty());
}

#[tokio::test]
async fn update_requires_ownership() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;

    // Not acquired yet: not started.
    let err = harness
        .server
        .update_job(update_request(fixture.job.id.to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::NotStarted));

    harness.server.acquire_job().await.unwrap();

    // A different server doesn't own it.
    let err = harness
        .sibling_server()
        .update_job(update_request(fixture.job.id.to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::NotOwner));

    // No writes landed from the rejected update.
    let logs = harness
        .store
        .get_job_logs_after(fixture.job.id, 0)
        .await
        .unwrap();
    assert!(logs.is_empty());
}

#[tokio::test]
async fn update_rejects_malformed_job_id() {
    let harness = harness();
    let err = harness
        .server
        .update_job(update_request("not-a-uuid".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidJobId(_)));
}

#[tokio::test]
async fn log_updates_fan_out_with_resume_cursor() {
    let harness = harness();
    // Another job's logs push the id sequence forward first.
    let other = seed_import_job(&harness.store).await;
    harness
        .store
        .insert_job_logs(InsertJobLogsParams {
            job_id: other.job.id,
            created_at: vec![Utc::now(); 40],
            source: vec![foundry_core::domain::job::LogSource::Provisioner; 40],
            level: vec![foundry_core::domain::job::LogLevel::Info; 40],
            stage: vec![String::new(); 40],
            output: vec![String::new(); 40],
        })
        .await
        .unwrap();

    let fixture = seed_import_job(&harness.store).await;
    // The older seeded job gets acquired first; drain it out of the queue.
    let first = harness.server.acquire_job().await.unwrap();
    assert_eq!(first.job_id, other.job.id.to_string());
    let acquired = harness.server.acquire_job().await.unwrap();
    assert_eq!(acquired.job_id, fixture.job.id.to_string());

    let mut log_events = harness
        .pubsub
        .subscribe(&job_logs_channel(fixture.job.id))
        .await
        .unwrap();

    let mut request = update_request(fixture.job.id.to_string());
    request.logs = vec![
        Log {
            created_at: Utc::now().timestamp_millis(),
            source: LogSource::Provisioner,
            level: LogLevel::Info,
            stage: "plan".to_string(),
            output: "line one".to_string(),
        },
        Log {
            created_at: Utc::now().timestamp_millis(),
            source: LogSource::Provisioner,
            level: LogLevel::Debug,
            stage: "plan".to_string(),
            output: "line two".to_string(),
        },
        Log {
            created_at: Utc::now().timestamp_millis(),
            source: LogSource::ProvisionerDaemon,
            level: LogLevel::Error,
            stage: "apply".to_string(),
            output: "line three".to_string(),
        },
    ];
    let response = harness.server.update_job(request).await.unwrap();
    assert!(!response.canceled);

    // Ids 41..43 were assigned; subscribers resume from 40.
    let events = drain(&mut log_events);
    assert_eq!(events.len(), 1);
    let message: serde_json::Value = serde_json::from_slice(&events[0]).unwrap();
    assert_eq!(message, json!({ "created_after": 40 }));

    let logs = harness
        .store
        .get_job_logs_after(fixture.job.id, 40)
        .await
        .unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0].id, 41);
    assert_eq!(logs[0].stage, "plan");
    assert_eq!(logs[2].output, "line three");
}

#[tokio::test]
async fn update_surfaces_cooperative_cancel() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    harness.server.acquire_job().await.unwrap();

    harness
        .store
        .update_job_canceled(fixture.job.id, Utc::now())
        .await
        .unwrap();

    let response = harness
        .server
        .update_job(update_request(fixture.job.id.to_string()))
        .await
        .unwrap();
    assert!(response.canceled);
}

#[tokio::test]
async fn update_persists_readme() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    harness.server.acquire_job().await.unwrap();

    let mut request = update_request(fixture.job.id.to_string());
    request.readme = Some("# My Template".to_string());
    harness.server.update_job(request).await.unwrap();

    let version = harness
        .store
        .get_template_version_by_job(fixture.job.id)
        .await
        .unwrap();
    assert_eq!(version.readme, "# My Template");
}

#[tokio::test]
async fn update_persists_schemas_and_returns_computed_values() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    harness.server.acquire_job().await.unwrap();

    let mut request = update_request(fixture.job.id.to_string());
    request.parameter_schemas = vec![ParameterSchema {
        name: "region".to_string(),
        description: "Deployment region".to_string(),
        default_source: Some(ParameterSource {
            scheme: ParameterSourceScheme::Data,
            value: "us-east-1".to_string(),
        }),
        allow_override_source: true,
        default_destination: Some(ParameterDestination {
            scheme: ParameterDestinationScheme::EnvironmentVariable,
        }),
        allow_override_destination: false,
        redisplay_value: false,
        validation_error: String::new(),
        validation_condition: String::new(),
        validation_type_system: ParameterTypeSystem::None,
        validation_value_type: "string".to_string(),
    }];

    let response = harness.server.update_job(request).await.unwrap();
    assert_eq!(response.parameter_values.len(), 1);
    assert_eq!(response.parameter_values[0].name, "region");
    assert_eq!(response.parameter_values[0].value, "us-east-1");
    assert_eq!(
        response.parameter_values[0].destination_scheme,
        ParameterDestinationScheme::EnvironmentVariable
    );

    let schemas = harness
        .store
        .get_parameter_schemas_by_job(fixture.job.id)
        .await
        .unwrap();
    assert_eq!(schemas.len(), 1);
    assert_eq!(schemas[0].index, 0);
    assert_eq!(schemas[0].name, "region");
}

struct FixedQuota;

#[async_trait]
impl foundry_orchestrator::service::quota::QuotaCommitter for FixedQuota {
    async fn commit_quota(
        &self,
        _request: &CommitQuotaRequest,
    ) -> Result<CommitQuotaResponse, JobError> {
        Ok(CommitQuotaResponse {
            ok: false,
            budget: 7,
        })
    }
}

#[tokio::test]
async fn quota_commit_defaults_to_unlimited_without_plugin() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    harness.server.acquire_job().await.unwrap();

    let response = harness
        .server
        .commit_quota(CommitQuotaRequest {
            job_id: fixture.job.id.to_string(),
            daily_cost: 10,
        })
        .await
        .unwrap();
    assert!(response.ok);
    assert_eq!(response.budget, -1);
}

#[tokio::test]
async fn quota_commit_delegates_to_installed_plugin() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    harness.server.acquire_job().await.unwrap();
    harness.server.install_quota_committer(Arc::new(FixedQuota));

    let response = harness
        .server
        .commit_quota(CommitQuotaRequest {
            job_id: fixture.job.id.to_string(),
            daily_cost: 10,
        })
        .await
        .unwrap();
    assert!(!response.ok);
    assert_eq!(response.budget, 7);
}

#[tokio::test]
async fn quota_commit_requires_ownership() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;

    let err = harness
        .server
        .commit_quota(CommitQuotaRequest {
            job_id: fixture.job.id.to_string(),
            daily_cost: 10,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::NotStarted));
}
