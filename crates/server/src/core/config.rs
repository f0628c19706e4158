//! Relay server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::auth::AuthManager;
use crate::directory::ContactDirectory;
use crate::relay::channel::ChannelSecret;
use crate::relay::keys::DEFAULT_MAX_KEY_BYTES;
use crate::relay::RelayHub;

/// Configuration for the relay server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind_addr: SocketAddr,
    /// Directory holding users.sqlite
    pub data_dir: PathBuf,
    /// Key for channel naming
    pub channel_secret: ChannelSecret,
    /// Whether `channel_secret` came from the environment
    pub secret_from_env: bool,
    /// Session lifetime in days
    pub session_days: i64,
    /// Largest accepted public key in bytes
    pub max_key_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            data_dir: PathBuf::from("relay_data"),
            channel_secret: ChannelSecret::random(),
            secret_from_env: false,
            session_days: 7,
            max_key_bytes: DEFAULT_MAX_KEY_BYTES,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `RELAY_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = env_parse("RELAY_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(dir) = std::env::var("RELAY_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(secret) = std::env::var("RELAY_SECRET") {
            if !secret.is_empty() {
                config.channel_secret = ChannelSecret::new(secret.into_bytes());
                config.secret_from_env = true;
            }
        }
        if let Some(days) = env_parse("RELAY_SESSION_DAYS") {
            config.session_days = days;
        }
        if let Some(bytes) = env_parse("RELAY_MAX_KEY_BYTES") {
            config.max_key_bytes = bytes;
        }
        config
    }

    /// Create config rooted at a custom data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("users.sqlite")
    }

    /// Ensure the data directory exists
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub auth: Arc<AuthManager>,
    pub contacts: Arc<ContactDirectory>,
    pub hub: Arc<RelayHub>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::with_data_dir("/tmp/relay-test");
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/relay-test/users.sqlite"));
        assert_eq!(config.session_days, 7);
        assert!(!config.secret_from_env);
    }
}
