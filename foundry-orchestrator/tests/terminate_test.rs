//! Fail and complete scenarios for the dispatch engine.

mod common;

use chrono::Utc;
use serde_json::json;

use foundry_core::domain::workspace::WorkspaceTransition;
use foundry_core::dto::job::{
    CompletedJob, CompletedJobKind, CompletedTemplateDryRun, CompletedTemplateImport,
    CompletedWorkspaceBuild, FailedJob, FailedJobKind, FailedWorkspaceBuild,
};
use foundry_core::dto::resource::{Agent, AgentAuth, App, Healthcheck, Resource};
use foundry_orchestrator::pubsub::Pubsub;
use foundry_orchestrator::service::{job_logs_channel, workspace_channel, JobError};
use foundry_orchestrator::store::Store;

use common::*;

fn resource_with_app(resource_name: &str, slug: &str) -> Resource {
    Resource {
        name: resource_name.to_string(),
        resource_type: "aws_instance".to_string(),
        agents: vec![Agent {
            id: "agent-id".to_string(),
            name: "dev".to_string(),
            operating_system: "linux".to_string(),
            architecture: "amd64".to_string(),
            apps: vec![App {
                slug: slug.to_string(),
                display_name: slug.to_string(),
                url: "http://localhost:13337".to_string(),
                healthcheck: Some(Healthcheck {
                    url: "http://localhost:13337/healthz".to_string(),
                    interval: 5,
                    threshold: 6,
                }),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn end_of_logs(payload: &[u8]) -> bool {
    let message: serde_json::Value = serde_json::from_slice(payload).unwrap();
    message["end_of_logs"] == json!(true)
}

#[tokio::test]
async fn fail_marks_job_terminal_and_updates_build_state() {
    let harness = harness();
    let fixture =
        seed_workspace_build_job(&harness.store, WorkspaceTransition::Start, None).await;
    harness.server.acquire_job().await.unwrap();

    let mut workspace_events = harness
        .pubsub
        .subscribe(&workspace_channel(fixture.workspace.id))
        .await
        .unwrap();
    let mut log_events = harness
        .pubsub
        .subscribe(&job_logs_channel(fixture.job.id))
        .await
        .unwrap();

    harness
        .server
        .fail_job(FailedJob {
            job_id: fixture.job.id.to_string(),
            error: "terraform apply exploded".to_string(),
            kind: Some(FailedJobKind::WorkspaceBuild(FailedWorkspaceBuild {
                state: Some(b"failed-state".to_vec()),
            })),
        })
        .await
        .unwrap();

    let job = harness
        .store
        .get_provisioner_job(fixture.job.id)
        .await
        .unwrap();
    assert!(job.completed_at.is_some());
    assert_eq!(job.error.as_deref(), Some("terraform apply exploded"));

    // State is captured; the deadline is left alone.
    let build = harness
        .store
        .get_workspace_build(fixture.build.id)
        .await
        .unwrap();
    assert_eq!(build.provisioner_state, b"failed-state");
    assert_eq!(build.deadline, None);

    assert_eq!(drain(&mut workspace_events).len(), 1);
    let logs = drain(&mut log_events);
    assert_eq!(logs.len(), 1);
    assert!(end_of_logs(&logs[0]));
}

#[tokio::test]
async fn fail_is_rejected_on_terminal_jobs() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    harness.server.acquire_job().await.unwrap();

    let request = FailedJob {
        job_id: fixture.job.id.to_string(),
        error: "boom".to_string(),
        kind: None,
    };
    harness.server.fail_job(request.clone()).await.unwrap();

    let err = harness.server.fail_job(request).await.unwrap_err();
    assert!(matches!(err, JobError::AlreadyCompleted));
}

#[tokio::test]
async fn fail_requires_ownership() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    harness.server.acquire_job().await.unwrap();

    let err = harness
        .sibling_server()
        .fail_job(FailedJob {
            job_id: fixture.job.id.to_string(),
            error: "boom".to_string(),
            kind: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::NotOwner));
}

#[tokio::test]
async fn complete_workspace_build_with_delete_removes_workspace() {
    let harness = harness();
    let fixture =
        seed_workspace_build_job(&harness.store, WorkspaceTransition::Delete, None).await;
    harness.server.acquire_job().await.unwrap();

    let mut workspace_events = harness
        .pubsub
        .subscribe(&workspace_channel(fixture.workspace.id))
        .await
        .unwrap();
    let mut log_events = harness
        .pubsub
        .subscribe(&job_logs_channel(fixture.job.id))
        .await
        .unwrap();

    harness
        .server
        .complete_job(CompletedJob {
            job_id: fixture.job.id.to_string(),
            kind: Some(CompletedJobKind::WorkspaceBuild(CompletedWorkspaceBuild {
                state: b"final-state".to_vec(),
                resources: vec![resource_with_app("dev", "code-server")],
            })),
        })
        .await
        .unwrap();

    // Job terminal, and terminal implies started.
    let job = harness
        .store
        .get_provisioner_job(fixture.job.id)
        .await
        .unwrap();
    assert!(job.completed_at.is_some());
    assert!(job.started_at.is_some());
    assert!(job.error.is_none());

    // No TTL: the deadline stays unset.
    let build = harness
        .store
        .get_workspace_build(fixture.build.id)
        .await
        .unwrap();
    assert_eq!(build.deadline, None);
    assert_eq!(build.provisioner_state, b"final-state");

    let workspace = harness
        .store
        .get_workspace(fixture.workspace.id)
        .await
        .unwrap();
    assert!(workspace.deleted);

    let resources = harness.server.job_resources(fixture.job.id).await.unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].transition, WorkspaceTransition::Delete);
    assert_eq!(resources[0].resource_type, "aws_instance");

    assert_eq!(drain(&mut workspace_events).len(), 1);
    let logs = drain(&mut log_events);
    assert_eq!(logs.len(), 1);
    assert!(end_of_logs(&logs[0]));
}

#[tokio::test]
async fn complete_workspace_build_derives_deadline_from_ttl() {
    let harness = harness();
    let ttl_millis = 3_600_000;
    let fixture = seed_workspace_build_job(
        &harness.store,
        WorkspaceTransition::Start,
        Some(ttl_millis),
    )
    .await;
    harness.server.acquire_job().await.unwrap();

    let before = Utc::now();
    harness
        .server
        .complete_job(CompletedJob {
            job_id: fixture.job.id.to_string(),
            kind: Some(CompletedJobKind::WorkspaceBuild(CompletedWorkspaceBuild {
                state: Vec::new(),
                resources: Vec::new(),
            })),
        })
        .await
        .unwrap();

    let build = harness
        .store
        .get_workspace_build(fixture.build.id)
        .await
        .unwrap();
    let deadline = build.deadline.expect("deadline should be set from the TTL");
    assert!(deadline >= before + chrono::Duration::milliseconds(ttl_millis));
    assert!(deadline <= Utc::now() + chrono::Duration::milliseconds(ttl_millis));

    // Start transition leaves the workspace alone.
    let workspace = harness
        .store
        .get_workspace(fixture.workspace.id)
        .await
        .unwrap();
    assert!(!workspace.deleted);
}

#[tokio::test]
async fn duplicate_app_slugs_roll_back_the_whole_complete() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    harness.server.acquire_job().await.unwrap();

    let err = harness
        .server
        .complete_job(CompletedJob {
            job_id: fixture.job.id.to_string(),
            kind: Some(CompletedJobKind::TemplateImport(CompletedTemplateImport {
                start_resources: vec![
                    resource_with_app("first", "ide"),
                    resource_with_app("second", "ide"),
                ],
                stop_resources: Vec::new(),
            })),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::DuplicateSlug(slug) if slug == "ide"));

    // The transaction rolled back: nothing persisted, job not terminal.
    let job = harness
        .store
        .get_provisioner_job(fixture.job.id)
        .await
        .unwrap();
    assert!(job.completed_at.is_none());
    let resources = harness.server.job_resources(fixture.job.id).await.unwrap();
    assert!(resources.is_empty());
}

#[tokio::test]
async fn invalid_app_slug_fails_complete() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    harness.server.acquire_job().await.unwrap();

    let err = harness
        .server
        .complete_job(CompletedJob {
            job_id: fixture.job.id.to_string(),
            kind: Some(CompletedJobKind::TemplateImport(CompletedTemplateImport {
                start_resources: vec![resource_with_app("dev", "Not A Slug")],
                stop_resources: Vec::new(),
            })),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidSlug(_)));
}

#[tokio::test]
async fn complete_template_import_materializes_both_transitions() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    harness.server.acquire_job().await.unwrap();

    harness
        .server
        .complete_job(CompletedJob {
            job_id: fixture.job.id.to_string(),
            kind: Some(CompletedJobKind::TemplateImport(CompletedTemplateImport {
                start_resources: vec![resource_with_app("dev", "code-server")],
                stop_resources: vec![Resource {
                    name: "dev".to_string(),
                    resource_type: "aws_instance".to_string(),
                    ..Default::default()
                }],
            })),
        })
        .await
        .unwrap();

    let resources = harness.server.job_resources(fixture.job.id).await.unwrap();
    assert_eq!(resources.len(), 2);
    let transitions: Vec<WorkspaceTransition> =
        resources.iter().map(|resource| resource.transition).collect();
    assert!(transitions.contains(&WorkspaceTransition::Start));
    assert!(transitions.contains(&WorkspaceTransition::Stop));

    let job = harness
        .store
        .get_provisioner_job(fixture.job.id)
        .await
        .unwrap();
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn complete_dry_run_materializes_start_resources() {
    let harness = harness();
    let import = seed_import_job(&harness.store).await;
    let store = &harness.store;

    // Queue a dry run against the imported version.
    let user = seed_user(store).await;
    let file = seed_file(store).await;
    let job = foundry_core::domain::job::ProvisionerJob {
        id: uuid::Uuid::new_v4(),
        created_at: Utc::now(),
        updated_at: None,
        started_at: None,
        canceled_at: None,
        completed_at: None,
        error: None,
        initiator_id: user.id,
        provisioner: foundry_core::domain::job::ProvisionerKind::Terraform,
        storage_method: foundry_core::domain::job::StorageMethod::File,
        file_id: file.id,
        job_type: foundry_core::domain::job::JobType::TemplateVersionDryRun,
        input: json!({
            "template_version_id": import.version.id,
            "workspace_name": "dry-run-ws",
            "parameter_values": [],
        }),
        tags: json!({}),
        worker_id: None,
    };
    store.insert_provisioner_job(job.clone()).await.unwrap();

    // Drain the older import job, then acquire the dry run.
    harness.server.acquire_job().await.unwrap();
    let acquired = harness.server.acquire_job().await.unwrap();
    assert_eq!(acquired.job_id, job.id.to_string());

    harness
        .server
        .complete_job(CompletedJob {
            job_id: job.id.to_string(),
            kind: Some(CompletedJobKind::TemplateDryRun(CompletedTemplateDryRun {
                resources: vec![resource_with_app("dev", "code-server")],
            })),
        })
        .await
        .unwrap();

    let resources = harness.server.job_resources(job.id).await.unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].transition, WorkspaceTransition::Start);
}

#[tokio::test]
async fn complete_without_payload_is_a_protocol_error() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    harness.server.acquire_job().await.unwrap();

    let err = harness
        .server
        .complete_job(CompletedJob {
            job_id: fixture.job.id.to_string(),
            kind: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Protocol(_)));
}

#[tokio::test]
async fn complete_requires_ownership() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    harness.server.acquire_job().await.unwrap();

    let err = harness
        .sibling_server()
        .complete_job(CompletedJob {
            job_id: fixture.job.id.to_string(),
            kind: Some(CompletedJobKind::TemplateImport(
                CompletedTemplateImport::default(),
            )),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::NotOwner));
}

#[tokio::test]
async fn materializer_parses_worker_supplied_tokens() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    harness.server.acquire_job().await.unwrap();

    let token = uuid::Uuid::new_v4();
    let mut resource = resource_with_app("dev", "code-server");
    resource.agents[0].auth = Some(AgentAuth::Token(token.to_string()));

    harness
        .server
        .complete_job(CompletedJob {
            job_id: fixture.job.id.to_string(),
            kind: Some(CompletedJobKind::TemplateImport(CompletedTemplateImport {
                start_resources: vec![resource],
                stop_resources: Vec::new(),
            })),
        })
        .await
        .unwrap();

    let job = harness
        .store
        .get_provisioner_job(fixture.job.id)
        .await
        .unwrap();
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn materializer_rejects_malformed_tokens() {
    let harness = harness();
    let fixture = seed_import_job(&harness.store).await;
    harness.server.acquire_job().await.unwrap();

    let mut resource = resource_with_app("dev", "code-server");
    resource.agents[0].auth = Some(AgentAuth::Token("not-a-uuid".to_string()));

    let err = harness
        .server
        .complete_job(CompletedJob {
            job_id: fixture.job.id.to_string(),
            kind: Some(CompletedJobKind::TemplateImport(CompletedTemplateImport {
                start_resources: vec![resource],
                stop_resources: Vec::new(),
            })),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidAuthToken(_)));

    let job = harness
        .store
        .get_provisioner_job(fixture.job.id)
        .await
        .unwrap();
    assert!(job.completed_at.is_none());
}
