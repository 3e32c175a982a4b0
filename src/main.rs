mod api;
mod auth;
mod config;
mod engine;
mod error;
mod models;
mod observability;
mod state;
mod store;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use crate::store::memory::MemoryStore;
use crate::store::{DocumentStore, FieldWrite, WriteBatch};

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    if let Some(path) = &config.seed_file {
        seed_store(store.as_ref(), path).await?;
    }

    let session = auth::SessionAuth::new(config.rider_id.clone(), config.rider_email.clone());
    let shared_state = Arc::new(state::AppState::new(store, session)?);

    shared_state.home.clone().initialize();

    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, rider_id = %config.rider_id, "session server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

/// Load documents from a JSON file shaped as
/// `{ collection: { id: { fields... } } }`.
async fn seed_store(store: &dyn DocumentStore, path: &str) -> Result<(), error::AppError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to read {path}: {err}")))?;
    let collections: BTreeMap<String, BTreeMap<String, Map<String, Value>>> =
        serde_json::from_str(&raw)
            .map_err(|err| error::AppError::Internal(format!("invalid seed file {path}: {err}")))?;

    let mut batch = WriteBatch::new();
    let mut count = 0usize;
    for (collection, documents) in &collections {
        for (id, fields) in documents {
            let writes: Vec<(String, FieldWrite)> = fields
                .iter()
                .map(|(key, value)| (key.clone(), FieldWrite::Set(value.clone())))
                .collect();
            batch = batch.put(collection, id, writes);
            count += 1;
        }
    }
    store.commit(batch).await?;

    tracing::info!(documents = count, path, "store seeded");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
