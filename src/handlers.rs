use axum::{
    Extension, Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::{
    backend::{BackendError, BackendState},
    config::AppConfig,
    gate::{self, GateContext},
    models::{LoginRequest, LoginSuccess, SessionView, SystemStatus},
    site::SiteState,
};

// --- Session Endpoints ---

/// login
///
/// [Public Route] Exchanges credentials for a session.
///
/// *Flow*: forwards the credentials to the backend login endpoint, then re-issues the
/// returned tokens under the gate's cookie names: `refresh` (HttpOnly) and `access`
/// (readable by the dashboard). Backend rejections are relayed with their status and body.
#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginSuccess),
        (status = 400, description = "Invalid credentials"),
        (status = 500, description = "Backend unreachable")
    )
)]
pub async fn login(
    State(backend): State<BackendState>,
    State(config): State<AppConfig>,
    Json(payload): Json<LoginRequest>,
) -> Response {
    match backend.login(&payload).await {
        Ok(outcome) => {
            let mut jar = CookieJar::new().add(gate::access_cookie(&outcome.access, &config));
            if let Some(refresh) = &outcome.refresh {
                jar = jar.add(gate::refresh_cookie(refresh, &config));
            } else {
                tracing::warn!("backend login returned no refresh token");
            }
            tracing::info!(username = %payload.username, "login succeeded");

            let body = LoginSuccess {
                success: true,
                user: outcome.user,
            };
            (jar, Json(body)).into_response()
        }
        Err(BackendError::Rejected { status, body }) => {
            tracing::info!(username = %payload.username, %status, "login rejected");
            (status, Json(body)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "login request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "detail": "Login request failed" })),
            )
                .into_response()
        }
    }
}

/// logout
///
/// [Public Route, never gated] Ends the session on the backend and locally.
///
/// The caller's cookies are forwarded so the backend can revoke its refresh cookie;
/// the local `refresh` and `access` cookies are cleared in every case.
#[utoipa::path(
    post,
    path = "/api/logout",
    responses(
        (status = 200, description = "Logged out"),
        (status = 500, description = "Backend unreachable")
    )
)]
pub async fn logout(State(backend): State<BackendState>, headers: HeaderMap) -> Response {
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok());

    let jar = gate::clear_session_cookies(CookieJar::new());

    match backend.logout(cookie_header).await {
        Ok(()) => (jar, Json(serde_json::json!({ "message": "Logged out" }))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "logout request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                jar,
                Json(serde_json::json!({ "error": "Logout failed" })),
            )
                .into_response()
        }
    }
}

/// get_status
///
/// [Public Route] The health and maintenance flags the gate computed for this request.
#[utoipa::path(
    get,
    path = "/api/status",
    responses((status = 200, description = "System status", body = SystemStatus))
)]
pub async fn get_status(Extension(ctx): Extension<GateContext>) -> Json<SystemStatus> {
    Json(ctx.status)
}

/// get_session
///
/// [Public Route] The user the gate resolved from the refresh cookie, with the
/// dashboard navigation of their role.
#[utoipa::path(
    get,
    path = "/api/session",
    responses(
        (status = 200, description = "Current session", body = SessionView),
        (status = 401, description = "No session")
    )
)]
pub async fn get_session(
    Extension(ctx): Extension<GateContext>,
) -> Result<Json<SessionView>, StatusCode> {
    ctx.user
        .map(|user| Json(SessionView::for_user(user)))
        .ok_or(StatusCode::UNAUTHORIZED)
}

// --- Site Pages ---

const SERVER_DOWN_PAGE: &str = "<!doctype html><html><head><title>Server unavailable</title></head>\
<body><h1>We'll be right back</h1><p>Our servers are currently unreachable. Please try again shortly.</p></body></html>";

/// landing
///
/// [Public Route] The site root. Picks the fallback page from the gate's status:
/// server-down when the backend is unhealthy, maintenance when the site is closed,
/// otherwise the regular home page from the site.
pub async fn landing(
    State(site): State<SiteState>,
    Extension(ctx): Extension<GateContext>,
    request: Request,
) -> Response {
    if !ctx.status.healthy {
        return (StatusCode::SERVICE_UNAVAILABLE, Html(SERVER_DOWN_PAGE)).into_response();
    }
    if ctx.status.under_maintenance {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Html(maintenance_page(ctx.status.date_of_online.as_deref())),
        )
            .into_response();
    }
    site.forward(request).await
}

fn maintenance_page(date_of_online: Option<&str>) -> String {
    let back_online = date_of_online
        .map(|date| format!("<p>Expected back online: {}</p>", escape_html(date)))
        .unwrap_or_default();
    format!(
        "<!doctype html><html><head><title>Under maintenance</title></head>\
<body><h1>Under maintenance</h1><p>The site is being updated.</p>{}</body></html>",
        back_online
    )
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// forward_to_site
///
/// Fallback for every path no local route claims: relayed to the site origin.
pub async fn forward_to_site(State(site): State<SiteState>, request: Request) -> Response {
    site.forward(request).await
}
