use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use foundry_orchestrator::config::Config;
use foundry_orchestrator::pubsub::PgPubsub;
use foundry_orchestrator::service::{Server, ServerOptions};
use foundry_orchestrator::store::PgStore;
use foundry_orchestrator::{api, db};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "foundry_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Foundry Orchestrator...");

    let config = Config::from_env().expect("Failed to read configuration");
    config.validate().expect("Invalid configuration");

    tracing::info!("Connecting to database...");

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let store = Arc::new(PgStore::new(pool.clone()));
    let pubsub = Arc::new(
        PgPubsub::new(pool)
            .await
            .expect("Failed to start pubsub listener"),
    );

    let server = Arc::new(Server::new(ServerOptions {
        id: config.server_id,
        access_url: config.access_url.clone(),
        provisioners: config.provisioners.clone(),
        tags: config.tags.clone(),
        store,
        pubsub,
        acquire_debounce: config.acquire_debounce,
    }));

    tracing::info!(
        "Dispatching {:?} jobs as server {}",
        config.provisioners,
        config.server_id
    );

    let app = api::create_router(server);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
