use anyhow::Context;
use library_lending::{
    adapters::{memory::InMemoryLibraryStore, postgres::PostgresLibraryStore},
    api::{AppState, create_router},
    application::ServiceDependencies,
    auth::AuthGate,
    config::AppConfig,
    ports::LibraryStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("library_lending={},tower_http=debug", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting library-lending v{}", env!("CARGO_PKG_VERSION"));

    let policy = config.lending_policy();

    // Select the store: PostgreSQL when a database URL is configured
    let database_url = config
        .database_url()
        .context("Refusing to start without a durable store")?;
    let store: Arc<dyn LibraryStore> = match database_url {
        Some(database_url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .connect(database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Connected to database");

            let store = PostgresLibraryStore::new(pool, policy.lock_timeout);
            store
                .migrate()
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database migrations completed");
            Arc::new(store)
        }
        None => {
            tracing::warn!(
                run_mode = config.run_mode.as_deref().unwrap_or("development"),
                "No database configured, using the in-memory store; state is lost on restart"
            );
            Arc::new(InMemoryLibraryStore::new())
        }
    };

    // Authentication
    let auth = Arc::new(AuthGate::new(config.session_ttl()));
    let admin = &config.auth.bootstrap_admin;
    auth.seed_admin(&admin.username, &admin.password)
        .context("Failed to seed bootstrap admin")?;

    // Create application state
    let app_state = Arc::new(AppState {
        service_deps: ServiceDependencies::new(store, policy),
        auth,
    });

    let app = create_router(app_state);

    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .context("Invalid server host address")?,
        config.server.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
