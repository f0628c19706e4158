//! Wire events exchanged over a bound connection.
//!
//! Frames are JSON objects tagged by an `event` field, e.g.
//! `{"event":"send","message":"...","recipient":"bobby"}`.

use crate::relay::identity::Identity;
use serde::{Deserialize, Serialize};

/// Client-originated events
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// The page finished loading; announce ourselves to contacts.
    Loaded,
    /// Relay an opaque ciphertext to another identity.
    Send { message: String, recipient: String },
    /// Ask which contacts are currently online.
    Check,
}

/// Server-originated events
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Session is missing or invalid. Always the last frame on a connection.
    Expired,
    Online { username: Identity },
    Offline { username: Identity },
    Receive { message: String, sender: Identity },
}
