//! Contact directory
//!
//! The contact graph is owned by the account layer; the relay only asks two
//! questions of it. [`ContactDirectory`] answers them from SQLite,
//! [`StaticDirectory`] from memory.

pub mod handlers;
mod sqlite;

pub use sqlite::ContactDirectory;

use crate::relay::identity::Identity;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("directory backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        DirectoryError::Backend(err.to_string())
    }
}

/// Read access to the contact graph.
///
/// Edges are directed: `lookup_contacts(owner)` lists the identities `owner`
/// has in their contact list.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    async fn lookup_contacts(&self, owner: &Identity) -> Result<HashSet<Identity>, DirectoryError>;

    /// Whether `candidate` is in `owner`'s contact list.
    async fn is_contact(&self, owner: &Identity, candidate: &Identity) -> Result<bool, DirectoryError> {
        Ok(self.lookup_contacts(owner).await?.contains(candidate))
    }
}

/// In-memory contact graph
#[derive(Default)]
pub struct StaticDirectory {
    edges: RwLock<HashMap<Identity, HashSet<Identity>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `contact` in `owner`'s list.
    pub fn add_edge(&self, owner: &Identity, contact: &Identity) {
        self.edges
            .write()
            .entry(owner.clone())
            .or_default()
            .insert(contact.clone());
    }

    pub fn add_mutual(&self, a: &Identity, b: &Identity) {
        self.add_edge(a, b);
        self.add_edge(b, a);
    }
}

#[async_trait]
impl DirectoryService for StaticDirectory {
    async fn lookup_contacts(&self, owner: &Identity) -> Result<HashSet<Identity>, DirectoryError> {
        Ok(self.edges.read().get(owner).cloned().unwrap_or_default())
    }
}
