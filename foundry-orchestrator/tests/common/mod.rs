//! Shared fixtures for the dispatch engine tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use foundry_core::domain::job::{JobType, ProvisionerJob, ProvisionerKind, StorageMethod};
use foundry_core::domain::template::{File, Template, TemplateVersion};
use foundry_core::domain::user::User;
use foundry_core::domain::workspace::{Workspace, WorkspaceBuild, WorkspaceTransition};
use foundry_orchestrator::pubsub::InMemoryPubsub;
use foundry_orchestrator::service::{Server, ServerOptions};
use foundry_orchestrator::store::{InMemoryStore, Store};

pub struct Harness {
    pub server: Arc<Server>,
    pub store: InMemoryStore,
    pub pubsub: InMemoryPubsub,
}

impl Harness {
    /// A second server instance sharing this harness's store and pubsub,
    /// for exercising ownership checks across competing servers.
    pub fn sibling_server(&self) -> Arc<Server> {
        new_server(&self.store, &self.pubsub, Duration::ZERO)
    }
}

pub fn harness() -> Harness {
    harness_with_debounce(Duration::ZERO)
}

pub fn harness_with_debounce(debounce: Duration) -> Harness {
    let store = InMemoryStore::new();
    let pubsub = InMemoryPubsub::new();
    let server = new_server(&store, &pubsub, debounce);
    Harness {
        server,
        store,
        pubsub,
    }
}

fn new_server(store: &InMemoryStore, pubsub: &InMemoryPubsub, debounce: Duration) -> Arc<Server> {
    Arc::new(Server::new(ServerOptions {
        id: Uuid::new_v4(),
        access_url: "https://foundry.example.com".to_string(),
        provisioners: vec![ProvisionerKind::Terraform],
        tags: json!({}),
        store: Arc::new(store.clone()),
        pubsub: Arc::new(pubsub.clone()),
        acquire_debounce: debounce,
    }))
}

pub async fn seed_user(store: &InMemoryStore) -> User {
    let user = User {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        username: "dev".to_string(),
        email: "dev@example.com".to_string(),
    };
    store.insert_user(user.clone()).await.unwrap();
    user
}

pub async fn seed_file(store: &InMemoryStore) -> File {
    let file = File {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        mimetype: "application/x-tar".to_string(),
        data: b"template-source".to_vec(),
    };
    store.insert_file(file.clone()).await.unwrap();
    file
}

async fn seed_job(
    store: &InMemoryStore,
    initiator_id: Uuid,
    file_id: Uuid,
    job_type: JobType,
    input: serde_json::Value,
) -> ProvisionerJob {
    let job = ProvisionerJob {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        updated_at: None,
        started_at: None,
        canceled_at: None,
        completed_at: None,
        error: None,
        initiator_id,
        provisioner: ProvisionerKind::Terraform,
        storage_method: StorageMethod::File,
        file_id,
        job_type,
        input,
        tags: json!({}),
        worker_id: None,
    };
    store.insert_provisioner_job(job.clone()).await.unwrap();
    job
}

pub struct ImportFixture {
    pub job: ProvisionerJob,
    pub version: TemplateVersion,
    pub user: User,
    pub file: File,
}

/// A queued template-version-import job with its version row.
pub async fn seed_import_job(store: &InMemoryStore) -> ImportFixture {
    let user = seed_user(store).await;
    let file = seed_file(store).await;
    let job = seed_job(
        store,
        user.id,
        file.id,
        JobType::TemplateVersionImport,
        json!({}),
    )
    .await;
    let version = TemplateVersion {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        updated_at: None,
        template_id: None,
        job_id: job.id,
        name: "v1".to_string(),
        readme: String::new(),
    };
    store.insert_template_version(version.clone()).await.unwrap();
    ImportFixture {
        job,
        version,
        user,
        file,
    }
}

pub struct BuildFixture {
    pub job: ProvisionerJob,
    pub build: WorkspaceBuild,
    pub workspace: Workspace,
    pub template: Template,
    pub version: TemplateVersion,
    pub owner: User,
    pub file: File,
}

/// A queued workspace-build job with its full hydration context.
pub async fn seed_workspace_build_job(
    store: &InMemoryStore,
    transition: WorkspaceTransition,
    ttl_millis: Option<i64>,
) -> BuildFixture {
    let owner = seed_user(store).await;
    let file = seed_file(store).await;

    let template = Template {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        updated_at: None,
        name: "dev-env".to_string(),
        active_version_id: None,
        created_by: owner.id,
    };
    store.insert_template(template.clone()).await.unwrap();

    let version = TemplateVersion {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        updated_at: None,
        template_id: Some(template.id),
        job_id: Uuid::new_v4(),
        name: "v1".to_string(),
        readme: String::new(),
    };
    store.insert_template_version(version.clone()).await.unwrap();

    let workspace = Workspace {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        updated_at: None,
        owner_id: owner.id,
        template_id: template.id,
        name: "dev".to_string(),
        ttl_millis,
        deleted: false,
    };
    store.insert_workspace(workspace.clone()).await.unwrap();

    let build_id = Uuid::new_v4();
    let job = seed_job(
        store,
        owner.id,
        file.id,
        JobType::WorkspaceBuild,
        json!({ "workspace_build_id": build_id, "dry_run": false }),
    )
    .await;

    let build = WorkspaceBuild {
        id: build_id,
        created_at: Utc::now(),
        updated_at: None,
        workspace_id: workspace.id,
        template_version_id: version.id,
        build_number: 1,
        transition,
        initiator_id: owner.id,
        job_id: job.id,
        provisioner_state: b"prior-state".to_vec(),
        deadline: None,
        daily_cost: 0,
    };
    store.insert_workspace_build(build.clone()).await.unwrap();

    BuildFixture {
        job,
        build,
        workspace,
        template,
        version,
        owner,
        file,
    }
}

/// Drains everything currently buffered on a subscription.
pub fn drain(receiver: &mut tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<Vec<u8>> {
    let mut messages = Vec::new();
    while let Ok(message) = receiver.try_recv() {
        messages.push(message);
    }
    messages
}
