//! Presence-aware chat relay server
//!
//! Authenticated WebSocket connections join a per-user channel; the server
//! tells contacts when users come and go, relays end-to-end encrypted
//! payloads between contacts, and acts as a rendezvous point for public keys.

pub mod core;
pub mod directory;
pub mod handlers;
pub mod relay;

use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::core::auth::AuthManager;
use crate::core::config::{AppState, ServerConfig};
use crate::core::db::open_pool;
use crate::directory::ContactDirectory;
use crate::relay::binder::IdentityBinder;
use crate::relay::RelayHub;

pub use crate::core::router::router as app;

/// Open storage and assemble the shared state for `config`.
pub async fn build_state(config: ServerConfig) -> anyhow::Result<AppState> {
    config.ensure_dirs().await?;

    let pool = open_pool(&config.db_path()).await?;
    info!("Users database: {:?}", config.db_path());

    let auth = Arc::new(AuthManager::new(pool.clone(), config.session_days).await?);
    let contacts = Arc::new(ContactDirectory::new(pool).await?);

    let hub = Arc::new(RelayHub::new(
        config.channel_secret.clone(),
        contacts.clone(),
        IdentityBinder::new(auth.clone()),
        config.max_key_bytes,
    ));
    info!("Relay hub initialized");

    Ok(AppState {
        config,
        auth,
        contacts,
        hub,
    })
}

pub async fn run() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        // Already set, ignore
    }

    info!("=== Relay Server ===");

    let config = ServerConfig::from_env();
    if !config.secret_from_env {
        warn!("RELAY_SECRET not set; channel names are random for this process");
    }

    let addr = config.bind_addr;
    let state = build_state(config).await?;
    let app = app(state);

    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
