// Back Office - HTTP API server

use anyhow::{Context, Result};
use clap::Parser;

use back_office::config::{CliArgs, Config};
use back_office::http::{router, AppState};
use back_office::{db, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();
    let config = Config::load(&cli)?;
    logging::init(&config.logging);

    let conn = db::open_database(&config.database.path)?;
    tracing::info!(database = %config.database.path.display(), "database opened");

    if !config.auth.enabled {
        tracing::warn!("authentication disabled: requests without a token run as an anonymous admin");
    }

    let state = AppState::new(conn, config.auth.enabled);
    let app = router(state);

    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(%addr, version = back_office::VERSION, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
