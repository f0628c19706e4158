//! Public key rendezvous.
//!
//! The server only stores and hands out public keys so that peers can find
//! each other; it never sees private keys or plaintext. Records live only as
//! long as their owner has a connection.

use crate::relay::identity::Identity;
use crate::relay::registry::RoomRegistry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

/// Default upper bound for a published key (armoured RSA-4096 fits easily).
pub const DEFAULT_MAX_KEY_BYTES: usize = 16 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("public key is empty")]
    Empty,

    #[error("public key is {len} bytes, limit is {max}")]
    TooLarge { len: usize, max: usize },

    #[error("public key must be printable ASCII")]
    NotPrintable,

    #[error("no live connection for this user")]
    Offline,
}

/// An opaque public key as published by a client (PEM or base64 text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(String);

impl PublicKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub struct KeyStore {
    keys: RwLock<HashMap<Identity, PublicKey>>,
    max_key_bytes: usize,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEY_BYTES)
    }
}

impl KeyStore {
    pub fn new(max_key_bytes: usize) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            max_key_bytes,
        }
    }

    /// Create or overwrite the identity's key. Returns `true` if a previous
    /// key was replaced.
    ///
    /// Rejected with [`KeyError::Offline`] when the identity has no live
    /// connection, since nothing would ever revoke the record.
    pub fn publish(&self, identity: &Identity, key: &str, registry: &RoomRegistry) -> Result<bool, KeyError> {
        let key = self.check(key)?;
        let mut keys = self.keys.write();
        if !registry.is_online(identity) {
            return Err(KeyError::Offline);
        }
        let replaced = keys.insert(identity.clone(), key).is_some();
        drop(keys);
        info!(
            "Public key {} for {}",
            if replaced { "replaced" } else { "published" },
            identity
        );
        Ok(replaced)
    }

    pub fn exists(&self, identity: &Identity) -> bool {
        self.keys.read().contains_key(identity)
    }

    pub fn fetch(&self, identity: &Identity) -> Option<PublicKey> {
        self.keys.read().get(identity).cloned()
    }

    /// Drop the identity's key unless it still has a live connection.
    ///
    /// The presence check happens under the store's write lock, so a key
    /// republished by a reconnecting device is never removed by a stale
    /// disconnect.
    pub fn revoke_if_offline(&self, identity: &Identity, registry: &RoomRegistry) -> bool {
        let mut keys = self.keys.write();
        if registry.is_online(identity) {
            return false;
        }
        let removed = keys.remove(identity).is_some();
        if removed {
            info!("Public key revoked for {}", identity);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    fn check(&self, key: &str) -> Result<PublicKey, KeyError> {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(KeyError::Empty);
        }
        if trimmed.len() > self.max_key_bytes {
            return Err(KeyError::TooLarge {
                len: trimmed.len(),
                max: self.max_key_bytes,
            });
        }
        if !trimmed
            .bytes()
            .all(|b| b.is_ascii_graphic() || b.is_ascii_whitespace())
        {
            return Err(KeyError::NotPrintable);
        }
        Ok(PublicKey(trimmed.to_string()))
    }
}
