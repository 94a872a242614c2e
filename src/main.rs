use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use backup_monitor::{config::Config, db::Database, importer::Importer, scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    // Use LOG_FORMAT=gcp for structured GCP Cloud Logging
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(tracing_subscriber::filter::LevelFilter::INFO)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .init();
    }

    info!("Starting Backup Monitor...");

    let config = Config::load();
    let interval = config.import_interval();
    info!("Database:        {}", config.db_path);
    info!("Metrics file:    {}", config.metrics_file);
    info!("Retention:       {} days", config.retention_days);
    info!("Import interval: {:.2} hours", interval.as_secs_f64() / 3600.0);

    let db = Database::new(&config.db_path).await?;
    db.run_migrations().await?;
    info!("Database initialized");

    let importer = Importer::new(
        db.clone(),
        config.metrics_file.clone().into(),
        config.retention_days,
    );

    // The scheduler runs the startup import pass, then one per interval
    let token = CancellationToken::new();
    let scheduler = scheduler::start(importer, interval, token.clone());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    token.cancel();
    scheduler.await?;

    Ok(())
}
