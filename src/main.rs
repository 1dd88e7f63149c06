// src/main.rs
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vehicle_search::api;
use vehicle_search::catalog::Catalog;
use vehicle_search::config::AppConfig;
use vehicle_search::optimizer::SearchEngine;

fn enable_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let dotenv_result = dotenvy::dotenv();
    enable_tracing();
    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();

    info!("🚗 Vehicle search service starting...");
    let listings_path = app_config.catalog.listings_path();
    let catalog = match Catalog::load(listings_path) {
        Ok(catalog) => catalog,
        Err(err) => {
            error!("❌ Could not load catalog: {}", err);
            std::process::exit(1);
        }
    };
    info!(
        "📚 Catalog loaded from {}: {} listings at {} locations",
        listings_path.display(),
        catalog.listing_count(),
        catalog.site_count()
    );

    let engine = Arc::new(SearchEngine::new(
        Arc::new(catalog),
        app_config.engine.search_config(),
    ));

    if let Err(err) =
        api::start_api_server(app_config.api, engine, app_config.engine.max_quantity()).await
    {
        error!("❌ API server terminated with an error: {}", err);
        std::process::exit(1);
    }
}
