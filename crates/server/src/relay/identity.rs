//! Validated usernames bound to connections.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Minimum username length in characters
pub const IDENTITY_MIN_LEN: usize = 4;
/// Maximum username length in characters
pub const IDENTITY_MAX_LEN: usize = 20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("username must be between 4 and 20 characters")]
    Length,

    #[error("username contains a disallowed character: {0:?}")]
    Character(char),
}

/// An authenticated username.
///
/// Only letters, digits, `_` and the Latin-1 letter block (U+00C0..=U+00FF)
/// are accepted, so an identity is always safe to echo back to clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn parse(raw: impl Into<String>) -> Result<Self, IdentityError> {
        let raw = raw.into();
        let len = raw.chars().count();
        if !(IDENTITY_MIN_LEN..=IDENTITY_MAX_LEN).contains(&len) {
            return Err(IdentityError::Length);
        }
        if let Some(bad) = raw.chars().find(|c| !is_allowed(*c)) {
            return Err(IdentityError::Character(bad));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || ('\u{00C0}'..='\u{00FF}').contains(&c)
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
