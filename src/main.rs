use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docbase_gateway::cli::ServerArgs;
use docbase_gateway::config::{self, AppConfig, StoreBackend};
use docbase_gateway::database::{DatabaseManager, MetadataStore, PgMetadataStore};
use docbase_gateway::state::AppState;
use docbase_gateway::store::memory::MemoryConnector;
use docbase_gateway::store::mongo::MongoConnector;
use docbase_gateway::store::Connector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, DOCUMENT_STORE, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = ServerArgs::parse();
    let config = args.apply(config::config().clone());
    info!("Starting DocBase gateway in {:?} mode", config.environment);

    let connector: Arc<dyn Connector> = match config.server.store {
        StoreBackend::MongoDb => Arc::new(MongoConnector::new(config.pool.connect_timeout())),
        StoreBackend::Memory => {
            warn!("Using the in-memory document store; documents are lost on exit");
            Arc::new(MemoryConnector::new())
        }
    };

    let state = build_state(connector, &config).await?;
    let reaper = state.pool.clone().spawn_reaper(config.pool.reap_interval());
    let app = docbase_gateway::app(state.clone(), &config);

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("DocBase gateway listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    reaper.abort();
    if let Some(manager) = &state.metadata {
        manager.close().await;
    }
    info!("Shutdown complete");
    Ok(())
}

async fn build_state(connector: Arc<dyn Connector>, config: &AppConfig) -> anyhow::Result<AppState> {
    let Some(url) = &config.database.url else {
        warn!("DATABASE_URL not set; projects and schemas will not survive a restart");
        return Ok(AppState::in_memory(connector, config));
    };

    let manager = DatabaseManager::connect(
        url,
        config.database.max_connections,
        Duration::from_secs(config.database.connection_timeout),
    )
    .await
    .context("failed to connect metadata database")?;

    let store = PgMetadataStore::new(&manager);
    store.migrate().await.context("failed to prepare metadata tables")?;
    let store: Arc<dyn MetadataStore> = Arc::new(store);

    let state = AppState::persistent(connector, config, manager, store).await?;
    info!(
        "Loaded {} projects and {} schemas",
        state.projects.len(),
        state.schemas.len()
    );
    Ok(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
