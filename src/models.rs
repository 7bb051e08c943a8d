use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

// --- Access Tiers ---

/// Role
///
/// The access tier of a dashboard account. Determines which route prefix a session
/// may reach and which dashboard the account lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    Manager,
    Sales,
}

impl Role {
    /// Parses the backend's role string. Anything outside the fixed set is `None`.
    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "sales" => Some(Role::Sales),
            _ => None,
        }
    }

    /// The dashboard route canonically associated with the role.
    pub fn home_route(&self) -> &'static str {
        match self {
            Role::Admin => "/admin",
            Role::Manager => "/manager",
            Role::Sales => "/sales",
        }
    }

    pub fn dashboard_title(&self) -> &'static str {
        match self {
            Role::Admin => "Admin Dashboard",
            Role::Manager => "Manager Dashboard",
            Role::Sales => "Sales Dashboard",
        }
    }

    /// Dashboard tabs the role is allowed to open, in display order.
    pub fn dashboard_tabs(&self) -> &'static [&'static str] {
        match self {
            Role::Admin => &[
                "exhibitors",
                "visitors",
                "events",
                "categories",
                "gallery",
                "manage-team",
                "account",
                "settings",
            ],
            Role::Manager => &["exhibitors", "visitors", "events", "gallery", "account"],
            Role::Sales => &["exhibitors", "visitors", "account"],
        }
    }
}

/// Home route for an optional role; unknown roles land on the site root.
pub fn home_route_for(role: Option<Role>) -> &'static str {
    role.map(|r| r.home_route()).unwrap_or("/")
}

// --- Collaborator Payloads (Backend Wire Formats) ---

/// HealthResponse
///
/// Body of the backend root endpoint. Every field is optional on the wire: a body
/// missing `status` is simply not healthy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub under_maintenance: Option<bool>,
    // Only meaningful while under maintenance.
    #[serde(default)]
    pub date_of_online: Option<String>,
}

/// RefreshResponse
///
/// Body of the cookie-based token refresh endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub access: Option<String>,
}

/// CurrentUser
///
/// The identity returned by the backend's "who am I" endpoint. Only `role` drives
/// gate decisions; the remaining fields are relayed to the dashboard as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CurrentUser {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    // Raw role string as sent by the backend (may be null for legacy accounts).
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl CurrentUser {
    /// The user's role if it is one of the known access tiers.
    pub fn role(&self) -> Option<Role> {
        self.role.as_deref().and_then(Role::parse)
    }
}

// --- Gate State (Mirrored to the Site) ---

/// SystemStatus
///
/// Health and maintenance flags computed by the gate for a single request.
/// Never cached: every gated request gets a fresh probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SystemStatus {
    pub healthy: bool,
    pub under_maintenance: bool,
    pub date_of_online: Option<String>,
}

impl SystemStatus {
    /// The safe default used whenever the probe fails in any way.
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            under_maintenance: false,
            date_of_online: None,
        }
    }

    /// Interprets a decoded health body: healthy only on an explicit `"ok"`,
    /// maintenance only on an explicit `true`.
    pub fn from_health(body: HealthResponse) -> Self {
        Self {
            healthy: body.status.as_deref() == Some("ok"),
            under_maintenance: body.under_maintenance == Some(true),
            date_of_online: body.date_of_online,
        }
    }
}

// --- Request / Response Payloads of the Session Endpoints ---

/// LoginRequest
///
/// Input payload for `POST /api/login`, forwarded verbatim to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// BackendLoginResponse
///
/// Success body of the backend login endpoint. The refresh token arrives separately
/// as a `Set-Cookie` header.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendLoginResponse {
    pub access: String,
    #[serde(default)]
    pub user: Option<CurrentUser>,
    // Some backend builds also return the refresh token in the body.
    #[serde(default)]
    pub refresh: Option<String>,
}

/// LoginSuccess
///
/// Body of a successful `POST /api/login`. Tokens travel only as cookies.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginSuccess {
    pub success: bool,
    pub user: Option<CurrentUser>,
}

/// SessionView
///
/// Body of `GET /api/session`: the resolved user plus what the dashboard needs
/// to render the role's navigation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionView {
    pub user: CurrentUser,
    pub role: Option<Role>,
    pub home_route: String,
    pub dashboard_title: Option<String>,
    pub tabs: Vec<String>,
}

impl SessionView {
    pub fn for_user(user: CurrentUser) -> Self {
        let role = user.role();
        Self {
            role,
            home_route: home_route_for(role).to_string(),
            dashboard_title: role.map(|r| r.dashboard_title().to_string()),
            tabs: role
                .map(|r| r.dashboard_tabs().iter().map(|t| t.to_string()).collect())
                .unwrap_or_default(),
            user,
        }
    }
}
