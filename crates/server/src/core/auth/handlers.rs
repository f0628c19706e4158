//! Auth handlers

use crate::core::auth::UserInfo;
use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::{Error, Result};
use crate::relay::binder::SESSION_COOKIE;
use crate::relay::identity::Identity;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub username: Identity,
}

fn session_cookie(token: &str, max_age_secs: i64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    );
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.insert(header::SET_COOKIE, value);
    }
    headers
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<(HeaderMap, Json<AuthResponse>)> {
    info!("POST /auth/signup - {}", req.username);

    let username = Identity::parse(req.username)?;
    if state.auth.user_exists(&username).await? {
        return Err(Error::Conflict(format!("Username already taken: {}", username)));
    }
    state
        .auth
        .signup(username.clone(), req.password.clone())
        .await
        .map_err(|e| {
            warn!("Signup failed for {}: {}", username, e);
            Error::BadRequest(e.to_string())
        })?;

    login_response(&state, &username, req.password).await
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<(HeaderMap, Json<AuthResponse>)> {
    info!("POST /auth/login - {}", req.username);

    let username = Identity::parse(req.username).map_err(|_| Error::LoginFail)?;
    login_response(&state, &username, req.password).await
}

async fn login_response(
    state: &AppState,
    username: &Identity,
    password: String,
) -> Result<(HeaderMap, Json<AuthResponse>)> {
    let (user, session) = state.auth.login(username, password).await.map_err(|e| {
        warn!("Login failed for {}: {}", username, e);
        Error::LoginFail
    })?;

    let headers = session_cookie(&session.token, state.config.session_days * 24 * 60 * 60);
    Ok((
        headers,
        Json(AuthResponse {
            token: session.token,
            username: user.username,
        }),
    ))
}

/// POST /auth/logout
pub async fn logout(State(state): State<AppState>, ctx: Ctx) -> Result<(StatusCode, HeaderMap)> {
    info!("POST /auth/logout - {}", ctx.identity());
    state.auth.logout(ctx.token()).await?;
    Ok((StatusCode::NO_CONTENT, session_cookie("", 0)))
}

/// GET /auth/me
pub async fn me(State(state): State<AppState>, ctx: Ctx) -> Result<Json<UserInfo>> {
    let user = state.auth.get_user(ctx.identity()).await?;
    Ok(Json(user))
}
