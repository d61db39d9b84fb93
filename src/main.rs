use anyhow::Result;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use twin_sentry::{auth, config, db, events, geo, waf, web};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    // Initialize logging based on LOG_FORMAT env var
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

    info!("Starting twin-sentry...");

    let config = config::Config::load()?;
    info!("Configuration loaded");

    let db = db::Database::new(&config.database).await?;
    db.run_migrations().await?;
    info!("Database initialized");

    let geo = geo::GeoClient::new(&config.geo);
    let waf: Arc<dyn waf::WafEngine> = Arc::new(waf::RemoteWafEngine::new(&config.waf));
    let identity: Arc<dyn auth::IdentityProvider> =
        Arc::new(auth::RemoteIdentityProvider::new(&config.auth));

    // Broadcast bus feeding the live dashboard stream
    let (event_tx, _) = tokio::sync::broadcast::channel(1000);
    let event_bus = events::EventBus::new(event_tx);

    let state = Arc::new(web::AppState {
        db,
        geo,
        waf,
        waf_fail_open: config.waf.fail_open,
        identity,
        event_bus,
    });

    // Start web server (blocking)
    web::start_server(&config, state).await?;

    Ok(())
}
