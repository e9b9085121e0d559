//! services/store/src/bin/bootstrap.rs
//!
//! Prepares a MongoDB database for the store: checks connectivity, builds the
//! indexes and reports where the document-id counter stands.

use store_lib::{
    adapters::mongo::MongoAdapter, config::Config, error::ServiceError, DOCUMENT_ID_COUNTER,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded for database `{}`", config.database_name);

    // --- 2. Connect to the Store ---
    info!("Connecting to database...");
    let adapter = MongoAdapter::connect(&config).await?;
    adapter.ping().await?;
    info!("Database reachable.");

    // --- 3. Indexes ---
    adapter.ensure_indexes().await?;

    // --- 4. Report ---
    match adapter.current_sequence(DOCUMENT_ID_COUNTER).await? {
        Some(seq) => info!("Document id counter at {}", seq),
        None => info!("Document id counter not created yet; the first id issued will be 1"),
    }

    info!("Store ready (timezone {}).", config.timezone);

    Ok(())
}
