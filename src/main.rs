use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use potluck::config::{Cli, Config};
use potluck::db;
use potluck::routes;
use potluck::state::AppState;

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
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Open database, run migrations, prepare uploads
    let state = AppState::new(config.clone())?;

    if let Some(username) = &cli.grant_admin {
        if db::grant_admin(&state.db, username)? {
            tracing::info!(%username, "Granted admin privileges");
        } else {
            tracing::warn!(%username, "Cannot grant admin: no such user");
        }
    }

    let app = routes::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
