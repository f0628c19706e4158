//! Core Router
//!
//! Public routes (signup, login, the WebSocket upgrade, health) and the
//! session-protected API.

use crate::core::auth::{handlers as auth_handlers, middleware::mw_require_auth};
use crate::core::AppState;
use crate::directory::handlers as contact_handlers;
use crate::handlers::{self, keys, ws};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/signup", post(auth_handlers::signup))
        .route("/auth/login", post(auth_handlers::login))
        // The socket authenticates itself and answers `expired` on failure
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(handlers::health_check));

    let protected = Router::new()
        .route("/auth/logout", post(auth_handlers::logout))
        .route("/auth/me", get(auth_handlers::me))
        // Key rendezvous
        .route("/keys", put(keys::publish_key))
        .route("/keys/exists", get(keys::key_exists))
        .route("/keys/{username}", get(keys::get_key))
        // Contacts
        .route("/contacts", get(contact_handlers::list_contacts))
        .route("/contacts/{username}", post(contact_handlers::add_contact))
        .route_layer(middleware::from_fn_with_state(state.clone(), mw_require_auth));

    public
        .merge(protected)
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
