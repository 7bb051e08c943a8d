use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;

use crate::{
    auth,
    backend::{BackendError, BackendService, BackendState},
    config::AppConfig,
    models::{CurrentUser, Role, SystemStatus, home_route_for},
};

// --- Cookie Names ---

pub const REFRESH_COOKIE: &str = "refresh";
pub const ACCESS_COOKIE: &str = "access";
pub const HEALTHY_COOKIE: &str = "backend_healthy";
pub const MAINTENANCE_COOKIE: &str = "under_maintenance";

// --- Route Tables ---

/// Paths that stay reachable while the site is under maintenance (with sub-paths).
const MAINTENANCE_ALLOWED: [&str; 3] = ["/", "/login", "/admin"];

/// Dashboard prefixes and the role each one requires.
const PROTECTED: [(&str, Role); 3] = [
    ("/admin", Role::Admin),
    ("/manager", Role::Manager),
    ("/sales", Role::Sales),
];

const STATIC_PREFIXES: [&str; 6] = [
    "/_next/", "/static/", "/assets/", "/media/", "/images/", "/fonts/",
];

const STATIC_EXTENSIONS: [&str; 10] = [
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".mp4", ".mp3", ".css", ".js",
];

/// True when `path` is `prefix` itself or lies underneath it.
pub fn is_under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Static assets are never gated: no probe, no cookies.
pub fn is_static_asset(path: &str) -> bool {
    path == "/favicon.ico"
        || STATIC_PREFIXES.iter().any(|p| path.starts_with(p))
        || STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// The site's logout endpoint must never be gated, otherwise a broken session
/// could not be ended.
pub fn is_logout_bypass(path: &str) -> bool {
    path == "/api/logout" || path == "/api/logout/"
}

/// canonical_path
///
/// The single form of `raw` the gate decides on and the site receives: escaped
/// unreserved characters decoded, escaped slashes and backslashes read as
/// separators, then empty, `.` and `..` segments resolved. A trailing slash is
/// kept. The result never starts with `//`.
pub fn canonical_path(raw: &str) -> String {
    let decoded = decode_path(raw);
    let trailing =
        decoded.ends_with('/') || decoded.ends_with("/.") || decoded.ends_with("/..");

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }
    let mut path = format!("/{}", segments.join("/"));
    if trailing {
        path.push('/');
    }
    path
}

fn decode_path(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                let byte = (hi << 4) | lo;
                match byte {
                    b'/' | b'\\' => out.push(b'/'),
                    b if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') => {
                        out.push(b)
                    }
                    // Everything else stays escaped, normalised to upper-case hex.
                    b => out.extend_from_slice(format!("%{b:02X}").as_bytes()),
                }
                i += 3;
                continue;
            }
        }
        out.push(if bytes[i] == b'\\' { b'/' } else { bytes[i] });
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

pub fn is_maintenance_allowed(path: &str) -> bool {
    MAINTENANCE_ALLOWED.iter().any(|p| is_under(path, p))
}

pub fn is_protected(path: &str) -> bool {
    required_role(path).is_some()
}

/// The role a path requires, or `None` for unrestricted paths.
pub fn required_role(path: &str) -> Option<Role> {
    PROTECTED
        .iter()
        .find(|(prefix, _)| is_under(path, prefix))
        .map(|(_, role)| *role)
}

// --- Decision Model ---

/// Outcome
///
/// What happens to the request itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Hand the request on to the application.
    Forward,
    /// Answer with a temporary redirect to this path.
    Redirect(String),
}

/// GateDecision
///
/// The complete result of evaluating one request: the outcome plus every cookie
/// side effect and the context handed to the application on pass-through.
#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    pub outcome: Outcome,
    /// `None` only for requests that bypass the gate.
    pub status: Option<SystemStatus>,
    /// Freshly minted access token, to be written to the `access` cookie.
    pub access: Option<String>,
    /// The session was found invalid: clear `refresh` (and any stale `access`).
    pub logout: bool,
    pub user: Option<CurrentUser>,
}

impl GateDecision {
    fn bypass() -> Self {
        Self {
            outcome: Outcome::Forward,
            status: None,
            access: None,
            logout: false,
            user: None,
        }
    }

    fn forward(status: SystemStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::bypass()
        }
    }

    fn redirect(mut self, to: &str) -> Self {
        self.outcome = Outcome::Redirect(to.to_string());
        self
    }

    /// Invalid session: back to the site root with the session cookies cleared.
    fn end_session(mut self) -> Self {
        self.access = None;
        self.user = None;
        self.logout = true;
        self.redirect("/")
    }

}

/// GateContext
///
/// Request extension carrying what the gate learned, for the handlers behind it.
#[derive(Debug, Clone)]
pub struct GateContext {
    pub status: SystemStatus,
    pub user: Option<CurrentUser>,
}

/// Session
///
/// A refresh token successfully turned into an access token and a resolved user.
struct Session {
    access: String,
    user: CurrentUser,
}

/// Where the session pipeline stopped.
enum SessionFailure {
    Refresh(BackendError),
    Identity(BackendError),
}

/// resolve_session
///
/// Refresh, then identity lookup. Each stage either yields its value or stops the pipeline.
async fn resolve_session(
    refresh: &str,
    backend: &dyn BackendService,
) -> Result<Session, SessionFailure> {
    let access = backend
        .refresh_access(refresh)
        .await
        .map_err(SessionFailure::Refresh)?;
    let user = backend
        .fetch_user(&access)
        .await
        .map_err(SessionFailure::Identity)?;
    Ok(Session { access, user })
}

/// evaluate
///
/// The gate's single-pass decision for one request. Collaborator failures are
/// absorbed into redirects; this never fails.
///
/// Order: logout bypass, health probe, unhealthy branch, maintenance branch,
/// protected-route auth check.
pub async fn evaluate(
    path: &str,
    refresh: Option<&str>,
    backend: &dyn BackendService,
) -> GateDecision {
    // 1. Bypass
    if is_logout_bypass(path) {
        return GateDecision::bypass();
    }

    // 2. Health probe
    let status = backend.check_health().await;
    let decision = GateDecision::forward(status.clone());

    // 3. Backend down: only the root (which renders the fallback) stays reachable.
    if !status.healthy {
        return if path == "/" {
            decision
        } else {
            decision.redirect("/")
        };
    }

    // 4. Maintenance
    if status.under_maintenance {
        if !is_maintenance_allowed(path) {
            return decision.redirect("/");
        }
        if !is_under(path, "/admin") {
            return decision;
        }
    }

    // 5. Protected routes
    check_protected(path, refresh, backend, decision).await
}

async fn check_protected(
    path: &str,
    refresh: Option<&str>,
    backend: &dyn BackendService,
    mut decision: GateDecision,
) -> GateDecision {
    if path == "/" {
        return decision;
    }

    let Some(refresh) = refresh else {
        return if is_protected(path) {
            decision.redirect("/")
        } else {
            decision
        };
    };

    let session = match resolve_session(refresh, backend).await {
        Ok(session) => session,
        Err(SessionFailure::Refresh(e)) => {
            tracing::warn!(path, error = %e, "refresh rejected; ending session");
            return decision.end_session();
        }
        Err(SessionFailure::Identity(e)) => {
            tracing::warn!(path, error = %e, "identity lookup failed; ending session");
            return decision.end_session();
        }
    };

    let role = session.user.role();
    decision.access = Some(session.access);
    decision.user = Some(session.user);

    if let Some(required) = required_role(path) {
        if role != Some(required) {
            return decision.redirect(home_route_for(role));
        }
    }

    // Already signed in: skip the login page.
    if path == "/login" {
        return decision.redirect(home_route_for(role));
    }

    decision
}

// --- Response Side Effects ---

fn flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// A cookie that instructs the browser to drop `name` on path `/`.
fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, "")).path("/").build();
    cookie.make_removal();
    cookie
}

/// The readable `access` cookie. Its lifetime follows the token's `exp` claim when
/// the claims can be read; otherwise it is a session cookie.
pub fn access_cookie(token: &str, config: &AppConfig) -> Cookie<'static> {
    let mut builder = Cookie::build((ACCESS_COOKIE, token.to_string()))
        .path("/")
        .http_only(false)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies);

    match auth::read_claims(token, config.jwt_secret.as_deref()) {
        Ok(claims) => {
            tracing::debug!(subject = ?claims.subject(), role = ?claims.role, "access token issued");
            if let Some(secs) = claims.remaining_secs(Utc::now()) {
                builder = builder.max_age(time::Duration::seconds(secs));
            }
        }
        Err(e) => tracing::debug!(reason = ?e, "access token claims unreadable; session cookie"),
    }
    builder.build()
}

/// The HttpOnly `refresh` cookie issued at login.
pub fn refresh_cookie(token: &str, config: &AppConfig) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies)
        .build()
}

/// Cookies that end the local session.
pub fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    jar.add(removal_cookie(REFRESH_COOKIE))
        .add(removal_cookie(ACCESS_COOKIE))
}

impl GateDecision {
    /// Writes the decision's cookie side effects into `jar`.
    pub fn apply_cookies(&self, mut jar: CookieJar, config: &AppConfig) -> CookieJar {
        if let Some(status) = &self.status {
            jar = jar
                .add(Cookie::build((HEALTHY_COOKIE, flag(status.healthy))).path("/"))
                .add(Cookie::build((MAINTENANCE_COOKIE, flag(status.under_maintenance))).path("/"));
        }
        if let Some(access) = &self.access {
            jar = jar.add(access_cookie(access, config));
        }
        if self.logout {
            jar = clear_session_cookies(jar);
        }
        jar
    }
}

// --- Middleware ---

/// gate_middleware
///
/// Runs `evaluate` in front of every route and turns the decision into a response:
/// pass-through (with the gate context attached to the request) or a temporary
/// redirect, carrying the decision's cookies either way.
pub async fn gate_middleware(
    State(backend): State<BackendState>,
    State(config): State<AppConfig>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    // Only canonical paths are gated and relayed; anything else is sent to its
    // canonical form first, so it is checked exactly like the path the site serves.
    let canonical = canonical_path(&path);
    if canonical != path {
        let target = match request.uri().query() {
            Some(query) => format!("{canonical}?{query}"),
            None => canonical,
        };
        tracing::debug!(path = %path, to = %target, "non-canonical path redirected");
        return Redirect::temporary(&target).into_response();
    }

    if is_static_asset(&path) {
        return next.run(request).await;
    }

    let refresh = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());

    let decision = evaluate(&path, refresh.as_deref(), backend.as_ref()).await;

    if let Some(user) = &decision.user {
        tracing::debug!(
            path = %path,
            user_id = ?user.id,
            role = ?user.role,
            "session resolved"
        );
    }

    let cookies = decision.apply_cookies(CookieJar::new(), &config);

    match decision.outcome {
        Outcome::Redirect(to) => {
            tracing::info!(path = %path, to = %to, logout = decision.logout, "gate redirect");
            (cookies, Redirect::temporary(&to)).into_response()
        }
        Outcome::Forward => {
            if let Some(status) = decision.status {
                request.extensions_mut().insert(GateContext {
                    status,
                    user: decision.user,
                });
            }
            let response = next.run(request).await;
            (cookies, response).into_response()
        }
    }
}
