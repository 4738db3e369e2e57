use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bloodlink::ai::OpenAiClient;
use bloodlink::auth::LogNotifier;
use bloodlink::config::{Cli, Config};
use bloodlink::db;
use bloodlink::routes;
use bloodlink::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    if config.ai.api_key.is_none() {
        tracing::warn!("No AI API key configured; the assistant will report errors");
    }
    let llm = OpenAiClient::new(&config.ai)?;

    let state = AppState::new(pool, config.clone(), Arc::new(LogNotifier), Arc::new(llm));

    // First snapshot for directory subscribers
    state.store.publish()?;

    let app = routes::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
