mod api;
mod config;
mod db;
mod error;
mod ingest;
mod metrics;
mod notify;
mod simpro;
mod types;
mod ui;

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::SnapshotStore;
use crate::error::Result;
use crate::notify::Notifier;
use crate::simpro::SimproClient;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // mode=rwc creates the database file on first start; DB_PATH should live
    // on the persistent volume so snapshots survive restarts.
    let pool = SqlitePoolOptions::new()
        .connect(&format!("sqlite:{}?mode=rwc", cfg.db_path))
        .await?;
    let store = SnapshotStore::new(pool);
    store.init().await?;
    info!("database ready at {}", cfg.db_path);

    let client = match cfg.simpro_credentials() {
        Some((base_url, client_id, client_secret)) => Some(Arc::new(SimproClient::new(
            base_url,
            client_id,
            client_secret,
            cfg.simpro_company_id,
        )?)),
        None => {
            warn!("Simpro credentials not set — live ingest disabled, demo mode available");
            None
        }
    };
    if cfg.slack_webhook_url.is_none() {
        info!("SLACK_WEBHOOK_URL not set — share-to-Slack will report not configured");
    }

    let state = ApiState {
        store,
        client,
        notifier: Arc::new(Notifier::new()?),
        policy: cfg.risk,
        webhook_url: cfg.slack_webhook_url.clone(),
    };
    let app = router(state);

    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP server listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
