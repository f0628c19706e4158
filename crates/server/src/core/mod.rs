//! Core Service Layer
//!
//! Shared infrastructure for the relay server: accounts and sessions,
//! configuration, errors and the request context.

pub mod auth;
pub mod config;
pub mod ctx;
pub mod db;
pub mod error;
pub mod router;

// Re-exports for convenience
pub use config::{AppState, ServerConfig};
pub use ctx::Ctx;
pub use error::{Error, Result};
pub use router::router;
