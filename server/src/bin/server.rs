//! Seatbook server binary.
//!
//! Loads configuration from the environment (and `.env`), connects the
//! `PostgreSQL` store, runs migrations and serves until Ctrl+C.

use seatbook_postgres::PostgresInventoryStore;
use seatbook_server::config::Config;
use seatbook_server::metrics::MetricsServer;
use seatbook_server::{Server, ServerError};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,seatbook=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(
        bind = %config.server.bind_address(),
        max_connections = config.server.max_connections,
        metrics = config.metrics.enabled,
        "Configuration loaded"
    );

    if config.metrics.enabled {
        let mut metrics = MetricsServer::new(config.metrics.bind_address().parse()?);
        metrics.start().map_err(ServerError::from)?;
    }

    let store = PostgresInventoryStore::connect(
        &config.database.url,
        config.database.max_connections,
        config.database.connect_timeout(),
    )
    .await
    .map_err(ServerError::from)?;
    store.migrate().await.map_err(ServerError::from)?;

    let server = Server::bind(&config.server, Arc::new(store)).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
