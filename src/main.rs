use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stationq::{
  config::Config,
  db::{self, SqliteStore},
  RequestWorker,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stationq=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config
    let config = Config::from_env()?;
    tracing::info!("Starting stationq request worker");
    tracing::info!("Database: {}", config.database_url);
    tracing::info!("Polling every {:?}", config.poll_interval);

    // Connect to database and run migrations
    let pool = db::create_pool(&config.database_url).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let worker = RequestWorker::new(store.clone(), store.clone(), store.clone(), store);

    let mut interval = tokio::time::interval(config.poll_interval);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match worker.poll().await {
                    Ok(report) if !report.failed.is_empty() => {
                        tracing::warn!("{} station(s) failed to poll", report.failed.len());
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Request poll failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
