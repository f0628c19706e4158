//! Authentication Module
//!
//! Handles account signup, login, and session management for the relay.
//! Accounts and sessions live in SQLite at <data_dir>/users.sqlite.

pub mod handlers;
pub mod middleware;

use crate::relay::binder::SessionResolver;
use crate::relay::identity::Identity;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Minimum password length
pub const PASSWORD_MIN_LEN: usize = 6;
/// Maximum password length
pub const PASSWORD_MAX_LEN: usize = 40;

/// Public user info (no sensitive data)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: Identity,
    pub created_at: DateTime<Utc>,
}

/// Session token for authenticated requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: Identity,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Auth manager handles all authentication
pub struct AuthManager {
    pool: SqlitePool,
    session_ttl: Duration,
    /// In-memory session cache
    sessions: RwLock<HashMap<String, Session>>,
}

impl AuthManager {
    /// Create new auth manager
    pub async fn new(pool: SqlitePool, session_days: i64) -> Result<Self> {
        let manager = Self {
            pool,
            session_ttl: Duration::days(session_days),
            sessions: RwLock::new(HashMap::new()),
        };

        manager.init_db().await?;
        info!("[Auth] Initialized");

        Ok(manager)
    }

    async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_login TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (username) REFERENCES users(username)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Register a new user
    pub async fn signup(&self, username: Identity, password: String) -> Result<UserInfo> {
        check_password(&password)?;

        if self.user_exists(&username).await? {
            return Err(anyhow::anyhow!("Username already taken"));
        }

        let password_hash = tokio::task::spawn_blocking(move || hash(password, DEFAULT_COST))
            .await?
            .context("Failed to hash password")?;

        let user = UserInfo {
            username,
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)")
            .bind(user.username.as_str())
            .bind(&password_hash)
            .bind(user.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        info!("[Auth] User registered: {}", user.username);

        Ok(user)
    }

    /// Login user and create session
    pub async fn login(&self, username: &Identity, password: String) -> Result<(UserInfo, Session)> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT password_hash, created_at FROM users WHERE username = ?")
                .bind(username.as_str())
                .fetch_optional(&self.pool)
                .await?;

        let (password_hash, created_at) =
            row.ok_or_else(|| anyhow::anyhow!("Invalid username or password"))?;

        let valid = tokio::task::spawn_blocking(move || verify(password, &password_hash))
            .await?
            .context("Failed to verify password")?;

        if !valid {
            warn!("[Auth] Failed login attempt for {}", username);
            return Err(anyhow::anyhow!("Invalid username or password"));
        }

        sqlx::query("UPDATE users SET last_login = ? WHERE username = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(username.as_str())
            .execute(&self.pool)
            .await?;

        let session = self.create_session(username).await?;

        let user = UserInfo {
            username: username.clone(),
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        };

        info!("[Auth] User logged in: {}", user.username);

        Ok((user, session))
    }

    async fn create_session(&self, username: &Identity) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().to_string(),
            username: username.clone(),
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        sqlx::query(
            "INSERT INTO sessions (token, username, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(session.username.as_str())
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());

        Ok(session)
    }

    /// Validate session token
    pub async fn validate_session(&self, token: &str) -> Result<Session> {
        self.lookup_session(token)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Invalid or expired session"))
    }

    /// `Ok(None)` for unknown or expired tokens; storage failures are errors.
    pub async fn lookup_session(&self, token: &str) -> Result<Option<Session>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(token) {
                if session.expires_at > Utc::now() {
                    return Ok(Some(session.clone()));
                }
            }
        }

        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT username, created_at, expires_at FROM sessions WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let Some((username, created_at, expires_at)) = row else {
            return Ok(None);
        };

        let expires_at: DateTime<Utc> = expires_at
            .parse()
            .with_context(|| format!("Corrupt session expiry {:?}", expires_at))?;
        if expires_at <= Utc::now() {
            self.sessions.write().await.remove(token);
            return Ok(None);
        }

        let session = Session {
            token: token.to_string(),
            username: Identity::parse(username)?,
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            expires_at,
        };
        self.sessions
            .write()
            .await
            .insert(token.to_string(), session.clone());
        Ok(Some(session))
    }

    /// Logout user (invalidate session)
    pub async fn logout(&self, token: &str) -> Result<()> {
        self.sessions.write().await.remove(token);

        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        info!("[Auth] Session invalidated");

        Ok(())
    }

    pub async fn user_exists(&self, username: &Identity) -> Result<bool> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT username FROM users WHERE username = ?")
                .bind(username.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(existing.is_some())
    }

    /// Get user by username
    pub async fn get_user(&self, username: &Identity) -> Result<UserInfo> {
        let row: Option<(String,)> = sqlx::query_as("SELECT created_at FROM users WHERE username = ?")
            .bind(username.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let (created_at,) = row.ok_or_else(|| anyhow::anyhow!("User not found"))?;
        Ok(UserInfo {
            username: username.clone(),
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[async_trait]
impl SessionResolver for AuthManager {
    async fn resolve_session(&self, token: &str) -> Result<Option<String>> {
        Ok(self
            .lookup_session(token)
            .await?
            .map(|session| session.username.into()))
    }
}

fn check_password(password: &str) -> Result<()> {
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(anyhow::anyhow!(
            "Password must be between {} and {} characters",
            PASSWORD_MIN_LEN,
            PASSWORD_MAX_LEN
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::open_pool;
    use tempfile::TempDir;

    async fn manager(temp_dir: &TempDir, session_days: i64) -> AuthManager {
        let pool = open_pool(&temp_dir.path().join("users.sqlite")).await.unwrap();
        AuthManager::new(pool, session_days).await.unwrap()
    }

    #[tokio::test]
    async fn test_signup_login_validate() {
        let temp_dir = TempDir::new().unwrap();
        let auth = manager(&temp_dir, 7).await;
        let alice = Identity::parse("alice").unwrap();

        auth.signup(alice.clone(), "secret123".into()).await.unwrap();
        assert!(auth.signup(alice.clone(), "secret123".into()).await.is_err());

        assert!(auth.login(&alice, "wrong-pass".into()).await.is_err());
        let (_, session) = auth.login(&alice, "secret123".into()).await.unwrap();

        let validated = auth.validate_session(&session.token).await.unwrap();
        assert_eq!(validated.username, alice);
        assert_eq!(
            auth.resolve_session(&session.token).await.unwrap().as_deref(),
            Some("alice")
        );

        auth.logout(&session.token).await.unwrap();
        assert!(auth.validate_session(&session.token).await.is_err());
        assert_eq!(auth.resolve_session(&session.token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_session_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let auth = manager(&temp_dir, 0).await;
        let alice = Identity::parse("alice").unwrap();

        auth.signup(alice.clone(), "secret123".into()).await.unwrap();
        let (_, session) = auth.login(&alice, "secret123".into()).await.unwrap();
        assert!(auth.validate_session(&session.token).await.is_err());
        assert_eq!(auth.resolve_session(&session.token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_a_missing_session() {
        let temp_dir = TempDir::new().unwrap();
        let auth = manager(&temp_dir, 7).await;
        assert_eq!(auth.resolve_session("no-such-token").await.unwrap(), None);

        auth.pool.close().await;
        assert!(auth.resolve_session("no-such-token").await.is_err());
        assert!(auth.lookup_session("no-such-token").await.is_err());
    }

    #[tokio::test]
    async fn test_password_bounds() {
        let temp_dir = TempDir::new().unwrap();
        let auth = manager(&temp_dir, 7).await;
        let alice = Identity::parse("alice").unwrap();

        assert!(auth.signup(alice.clone(), "short".into()).await.is_err());
        assert!(auth.signup(alice.clone(), "x".repeat(41)).await.is_err());
        assert!(!auth.user_exists(&alice).await.unwrap());
    }
}
