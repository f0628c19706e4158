//! SQLite-backed contact graph.
//!
//! Lives in the same database as the account tables (users.sqlite).

use super::{DirectoryError, DirectoryService};
use crate::relay::identity::Identity;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::{info, warn};

pub struct ContactDirectory {
    pool: SqlitePool,
}

impl ContactDirectory {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let directory = Self { pool };
        directory.init_db().await?;
        info!("[Contacts] Initialized");
        Ok(directory)
    }

    async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
                owner TEXT NOT NULL,
                contact TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (owner, contact)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a confirmed contact: each side lands in the other's list.
    pub async fn add_mutual(&self, a: &Identity, b: &Identity) -> Result<()> {
        if a == b {
            return Err(anyhow::anyhow!("Cannot add yourself as a contact"));
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for (owner, contact) in [(a, b), (b, a)] {
            sqlx::query(
                "INSERT OR IGNORE INTO contacts (owner, contact, created_at) VALUES (?, ?, ?)",
            )
            .bind(owner.as_str())
            .bind(contact.as_str())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!("[Contacts] {} <-> {}", a, b);
        Ok(())
    }
}

#[async_trait]
impl DirectoryService for ContactDirectory {
    async fn lookup_contacts(&self, owner: &Identity) -> Result<HashSet<Identity>, DirectoryError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT contact FROM contacts WHERE owner = ?")
            .bind(owner.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(name,)| match Identity::parse(name.clone()) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    warn!("[Contacts] Skipping invalid contact {:?} of {}: {}", name, owner, e);
                    None
                }
            })
            .collect())
    }

    async fn is_contact(&self, owner: &Identity, candidate: &Identity) -> Result<bool, DirectoryError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM contacts WHERE owner = ? AND contact = ?")
                .bind(owner.as_str())
                .bind(candidate.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }
}
