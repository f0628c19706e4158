//! Public key rendezvous endpoints
//!
//! All routes require a session; the caller's identity comes from [`Ctx`].

use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::Result;
use crate::relay::identity::Identity;
use crate::relay::keys::PublicKey;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize)]
pub struct KeyExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Deserialize)]
pub struct PublishKeyRequest {
    pub public_key: String,
}

#[derive(Debug, Serialize)]
pub struct KeyLookupResponse {
    pub username: Identity,
    pub public_key: Option<PublicKey>,
}

/// GET /keys/exists
pub async fn key_exists(State(state): State<AppState>, ctx: Ctx) -> Json<KeyExistsResponse> {
    Json(KeyExistsResponse {
        exists: state.hub.keys().exists(ctx.identity()),
    })
}

/// PUT /keys - 409 unless the caller has an open socket
pub async fn publish_key(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(req): Json<PublishKeyRequest>,
) -> Result<StatusCode> {
    info!("PUT /keys - {}", ctx.identity());
    state.hub.publish_key(ctx.identity(), &req.public_key)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /keys/{username}
pub async fn get_key(
    State(state): State<AppState>,
    _ctx: Ctx,
    Path(username): Path<String>,
) -> Result<Json<KeyLookupResponse>> {
    let username = Identity::parse(username)?;
    let public_key = state.hub.keys().fetch(&username);
    Ok(Json(KeyLookupResponse {
        username,
        public_key,
    }))
}
