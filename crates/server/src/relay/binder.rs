//! Identity binding for freshly upgraded connections.

use crate::relay::identity::Identity;
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session";

/// Looks up the username behind a session token.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// `Ok(None)` for unknown or expired tokens.
    async fn resolve_session(&self, token: &str) -> anyhow::Result<Option<String>>;
}

/// Whatever the transport knew about the client at connect time.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    token: Option<String>,
}

impl SessionContext {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Bearer header, then session cookie, then the `token` query parameter.
    pub fn from_request(headers: &HeaderMap, query_token: Option<String>) -> Self {
        Self {
            token: session_token(headers).or(query_token.filter(|t| !t.is_empty())),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Extract a session token from `Authorization: Bearer` or the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Bound(Identity),
    Unauthenticated,
}

pub struct IdentityBinder {
    resolver: Arc<dyn SessionResolver>,
}

impl IdentityBinder {
    pub fn new(resolver: Arc<dyn SessionResolver>) -> Self {
        Self { resolver }
    }

    /// Resolve the connection's identity. Called once per connection.
    pub async fn bind(&self, context: &SessionContext) -> Binding {
        let Some(token) = context.token() else {
            debug!("Connection without session token");
            return Binding::Unauthenticated;
        };

        let username = match self.resolver.resolve_session(token).await {
            Ok(Some(username)) => username,
            Ok(None) => {
                debug!("Connection with unknown or expired session");
                return Binding::Unauthenticated;
            }
            Err(e) => {
                warn!("Session lookup failed: {}", e);
                return Binding::Unauthenticated;
            }
        };

        match Identity::parse(username) {
            Ok(identity) => Binding::Bound(identity),
            Err(e) => {
                warn!("Session resolved to an invalid username: {}", e);
                Binding::Unauthenticated
            }
        }
    }
}
