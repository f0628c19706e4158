//! Contact list endpoints

use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::{Error, Result};
use crate::directory::DirectoryService;
use crate::relay::identity::Identity;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct ContactEntry {
    pub username: Identity,
    pub online: bool,
}

/// GET /contacts
pub async fn list_contacts(State(state): State<AppState>, ctx: Ctx) -> Result<Json<Vec<ContactEntry>>> {
    let contacts = state.contacts.lookup_contacts(ctx.identity()).await?;
    let mut entries: Vec<ContactEntry> = contacts
        .into_iter()
        .map(|username| ContactEntry {
            online: state.hub.registry().is_online(&username),
            username,
        })
        .collect();
    entries.sort_by(|a, b| a.username.cmp(&b.username));
    Ok(Json(entries))
}

/// POST /contacts/{username} - confirm a contact in both directions
pub async fn add_contact(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(username): Path<String>,
) -> Result<StatusCode> {
    let other = Identity::parse(username)?;
    info!("POST /contacts/{} - {}", other, ctx.identity());

    if &other == ctx.identity() {
        return Err(Error::BadRequest("Cannot add yourself as a contact".into()));
    }
    if !state.auth.user_exists(&other).await? {
        return Err(Error::NotFound(format!("Unknown user: {}", other)));
    }

    state.contacts.add_mutual(ctx.identity(), &other).await?;
    Ok(StatusCode::NO_CONTENT)
}
