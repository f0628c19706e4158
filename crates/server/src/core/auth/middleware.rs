use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::{Error, Result};
use crate::relay::binder::session_token;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

pub async fn mw_require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    debug!("MIDDLEWARE: require_auth");

    // Bearer header or session cookie
    let token = session_token(req.headers()).ok_or(Error::AuthFailNoToken)?;

    let session = state
        .auth
        .validate_session(&token)
        .await
        .map_err(|_| Error::AuthFailInvalidSession)?;

    req.extensions_mut().insert(Ctx::new(session.username, token));

    Ok(next.run(req).await)
}
