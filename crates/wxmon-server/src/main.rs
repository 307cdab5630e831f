use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use wxmon_alert::engine::AlertEngine;
use wxmon_alert::ingest::IngestionCoordinator;
use wxmon_server::config::ServerConfig;
use wxmon_server::state::AppState;
use wxmon_server::{api, mqtt, rule_seed};
use wxmon_storage::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    wxmon_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = match ServerConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %config_path, error = %e, "Config not loaded, using defaults");
            ServerConfig::default()
        }
    };

    tracing::info!(
        http_port = config.http_port,
        db_path = %config.db_path,
        broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        "wxmon-server starting"
    );

    let store = Arc::new(SqliteStore::open(Path::new(&config.db_path))?);

    // Seed default alert rules (only when the DB has none)
    if let Err(e) = rule_seed::init_default_rules(&store, &config.cities) {
        tracing::error!(error = %e, "Failed to seed default alert rules");
    }

    let engine = AlertEngine::new(store.clone(), store.clone());
    let coordinator = Arc::new(IngestionCoordinator::new(store.clone(), engine));

    // MQTT ingest worker; exhausting its retry budget is fatal
    let ingest_handle = tokio::spawn(mqtt::run_subscriber(config.mqtt.clone(), coordinator));

    // HTTP server
    let app = api::build_router(AppState {
        store: store.clone(),
    });
    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(http = %http_addr, "Server started");

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        result = ingest_handle => {
            match result {
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Ingest worker failed");
                    return Err(e);
                }
                Ok(Ok(())) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Ingest worker panicked");
                    return Err(e.into());
                }
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("Shutting down gracefully");
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}
