use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Session Router Module
///
/// Owns the lifecycle of the `access` / `refresh` cookie pair: creation at login,
/// destruction at logout. The gate itself handles refresh.
pub fn session_routes() -> Router<AppState> {
    Router::new()
        // POST /api/login
        // Credential exchange; issues both session cookies.
        .route("/api/login", post(handlers::login))
        // POST /api/logout
        // Never gated. Trailing-slash variant kept for clients of the backend's URL style.
        .route("/api/logout", post(handlers::logout))
        .route("/api/logout/", post(handlers::logout))
        // GET /api/session
        // The resolved user plus the dashboard navigation of their role.
        .route("/api/session", get(handlers::get_session))
}
