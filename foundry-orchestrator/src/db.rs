use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL,
            username VARCHAR(255) NOT NULL,
            email VARCHAR(255) NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id UUID PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL,
            mimetype VARCHAR(64) NOT NULL DEFAULT '',
            data BYTEA NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS templates (
            id UUID PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ,
            name VARCHAR(64) NOT NULL,
            active_version_id UUID,
            created_by UUID NOT NULL REFERENCES users(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS provisioner_jobs (
            id UUID PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ,
            started_at TIMESTAMPTZ,
            canceled_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            error TEXT,
            initiator_id UUID NOT NULL,
            provisioner VARCHAR(20) NOT NULL,
            storage_method VARCHAR(20) NOT NULL,
            file_id UUID NOT NULL,
            job_type VARCHAR(40) NOT NULL,
            input JSONB NOT NULL DEFAULT '{}',
            tags JSONB NOT NULL DEFAULT '{}',
            worker_id UUID
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS template_versions (
            id UUID PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ,
            template_id UUID REFERENCES templates(id),
            job_id UUID NOT NULL REFERENCES provisioner_jobs(id),
            name VARCHAR(64) NOT NULL,
            readme TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workspaces (
            id UUID PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ,
            owner_id UUID NOT NULL REFERENCES users(id),
            template_id UUID NOT NULL REFERENCES templates(id),
            name VARCHAR(64) NOT NULL,
            ttl_millis BIGINT,
            deleted BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workspace_builds (
            id UUID PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ,
            workspace_id UUID NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            template_version_id UUID NOT NULL REFERENCES template_versions(id),
            build_number INTEGER NOT NULL DEFAULT 1,
            transition VARCHAR(20) NOT NULL,
            initiator_id UUID NOT NULL,
            job_id UUID NOT NULL REFERENCES provisioner_jobs(id),
            provisioner_state BYTEA NOT NULL DEFAULT ''::bytea,
            deadline TIMESTAMPTZ,
            daily_cost INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS provisioner_job_logs (
            id BIGSERIAL PRIMARY KEY,
            job_id UUID NOT NULL REFERENCES provisioner_jobs(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL,
            source VARCHAR(40) NOT NULL,
            level VARCHAR(10) NOT NULL,
            stage VARCHAR(128) NOT NULL DEFAULT '',
            output TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parameter_schemas (
            id UUID PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL,
            job_id UUID NOT NULL REFERENCES provisioner_jobs(id) ON DELETE CASCADE,
            name VARCHAR(64) NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            default_source_scheme VARCHAR(40) NOT NULL,
            default_source_value TEXT NOT NULL DEFAULT '',
            allow_override_source BOOLEAN NOT NULL DEFAULT FALSE,
            default_destination_scheme VARCHAR(40) NOT NULL,
            allow_override_destination BOOLEAN NOT NULL DEFAULT FALSE,
            redisplay_value BOOLEAN NOT NULL DEFAULT FALSE,
            validation_error VARCHAR(256) NOT NULL DEFAULT '',
            validation_condition VARCHAR(512) NOT NULL DEFAULT '',
            validation_type_system VARCHAR(10) NOT NULL,
            validation_value_type VARCHAR(64) NOT NULL DEFAULT '',
            "index" INTEGER NOT NULL DEFAULT 0,
            UNIQUE(job_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parameter_values (
            id UUID PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ,
            scope VARCHAR(20) NOT NULL,
            scope_id UUID NOT NULL,
            name VARCHAR(64) NOT NULL,
            source_scheme VARCHAR(40) NOT NULL,
            source_value TEXT NOT NULL DEFAULT '',
            destination_scheme VARCHAR(40) NOT NULL,
            UNIQUE(scope, scope_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workspace_resources (
            id UUID PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL,
            job_id UUID NOT NULL REFERENCES provisioner_jobs(id) ON DELETE CASCADE,
            transition VARCHAR(20) NOT NULL,
            type VARCHAR(192) NOT NULL,
            name VARCHAR(64) NOT NULL,
            hide BOOLEAN NOT NULL DEFAULT FALSE,
            icon TEXT NOT NULL DEFAULT '',
            instance_type VARCHAR(256),
            daily_cost INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workspace_agents (
            id UUID PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ,
            resource_id UUID NOT NULL REFERENCES workspace_resources(id) ON DELETE CASCADE,
            name VARCHAR(64) NOT NULL,
            auth_token UUID NOT NULL,
            auth_instance_id VARCHAR(64),
            architecture VARCHAR(64) NOT NULL DEFAULT '',
            operating_system VARCHAR(64) NOT NULL DEFAULT '',
            directory VARCHAR(4096) NOT NULL DEFAULT '',
            env JSONB,
            startup_script TEXT,
            connection_timeout_seconds INTEGER NOT NULL DEFAULT 0,
            troubleshooting_url TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workspace_apps (
            id UUID PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL,
            agent_id UUID NOT NULL REFERENCES workspace_agents(id) ON DELETE CASCADE,
            slug VARCHAR(64) NOT NULL,
            display_name VARCHAR(64) NOT NULL DEFAULT '',
            icon TEXT NOT NULL DEFAULT '',
            command TEXT,
            url TEXT,
            subdomain BOOLEAN NOT NULL DEFAULT FALSE,
            sharing_level VARCHAR(20) NOT NULL,
            healthcheck_url TEXT NOT NULL DEFAULT '',
            healthcheck_interval INTEGER NOT NULL DEFAULT 0,
            healthcheck_threshold INTEGER NOT NULL DEFAULT 0,
            health VARCHAR(20) NOT NULL,
            UNIQUE(agent_id, slug)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workspace_resource_metadata (
            id BIGSERIAL PRIMARY KEY,
            workspace_resource_id UUID NOT NULL REFERENCES workspace_resources(id) ON DELETE CASCADE,
            key VARCHAR(1024) NOT NULL,
            value VARCHAR(65536),
            sensitive BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The acquire query scans only unowned jobs; index them by age.
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_provisioner_jobs_queue \
         ON provisioner_jobs(created_at) WHERE started_at IS NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_provisioner_job_logs_job_id \
         ON provisioner_job_logs(job_id, id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_workspace_resources_job_id \
         ON workspace_resources(job_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_parameter_values_scope \
         ON parameter_values(scope, scope_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
