use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assistant_core::{
    api::routes::{self, AppState},
    config::Config,
    services::registry::build_registry,
    storage::{self, repository::SeaOrmChatRepository},
};

#[derive(Debug, Parser)]
#[command(name = "assistant-core", version, about = "Conversational assistant backend")]
struct Args {
    /// Config file (toml, yaml or json); defaults to ~/.assistant/config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured server port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Load config
    let mut config = match &args.config {
        Some(path) => Config::load_from(path, true)?,
        None => Config::load()?,
    };
    if let Some(port) = args.port {
        config.server_port = port;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("assistant_core={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let models = build_registry(&config).ids().join(", ");
    let port = config.server_port;
    let db_url = config.database_url.clone();
    let config = Arc::new(RwLock::new(config));

    // Initialize database
    let db_conn = storage::init_db(&db_url).await?;
    let repository = Arc::new(SeaOrmChatRepository::new(db_conn));

    let state = AppState::new(config.clone(), repository);
    let app = routes::create_router(state).await;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Database: {}", db_url);
    tracing::info!("Models: {}", models);

    axum::serve(listener, app).await?;

    Ok(())
}
