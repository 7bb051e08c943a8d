use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Routes open to anonymous visitors. They still pass through the gate, so they only
/// ever run with a `GateContext` attached.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        // Site root: server-down or maintenance fallback, otherwise the site's home page.
        .route("/", get(handlers::landing))
        // GET /api/status
        // The health/maintenance flags computed for this request.
        .route("/api/status", get(handlers::get_status))
}
