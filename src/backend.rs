use async_trait::async_trait;
use axum::http::{StatusCode, header};
use axum_extra::extract::cookie::Cookie;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::config::AppConfig;
use crate::models::{
    BackendLoginResponse, CurrentUser, HealthResponse, LoginRequest, RefreshResponse, SystemStatus,
};

/// BackendError
///
/// Typed failures of the REST backend collaborator. The gate folds all of them into
/// its safe defaults; the session handlers map them onto HTTP statuses.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network failure, timeout or unreadable body.
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend rejected the request with {status}")]
    Rejected {
        status: StatusCode,
        body: serde_json::Value,
    },

    /// A success response that lacks a field the contract requires.
    #[error("backend response is missing `{0}`")]
    MissingField(&'static str),
}

/// LoginOutcome
///
/// A successful credential exchange: the fresh token pair plus the user payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    pub access: String,
    pub refresh: Option<String>,
    pub user: Option<CurrentUser>,
}

// 1. BackendService Contract
/// BackendService
///
/// The HTTP contracts of the REST backend that the gate and the session endpoints
/// rely on. Swapping the implementation (real HTTP vs in-memory mock) is how the
/// gate is exercised in tests without a running backend.
#[async_trait]
pub trait BackendService: Send + Sync {
    /// Probes the backend root. Never fails: any problem is reported as unhealthy.
    async fn check_health(&self) -> SystemStatus;

    /// Exchanges a refresh token for a fresh access token.
    async fn refresh_access(&self, refresh: &str) -> Result<String, BackendError>;

    /// Resolves the user behind an access token.
    async fn fetch_user(&self, access: &str) -> Result<CurrentUser, BackendError>;

    /// Exchanges credentials for a token pair.
    async fn login(&self, credentials: &LoginRequest) -> Result<LoginOutcome, BackendError>;

    /// Tells the backend to end the session carried by `cookie_header`.
    async fn logout(&self, cookie_header: Option<&str>) -> Result<(), BackendError>;
}

/// BackendState
///
/// The concrete type used to share the backend collaborator across the application state.
pub type BackendState = Arc<dyn BackendService>;

// 2. The Real Implementation (REST over reqwest)
/// HttpBackend
///
/// Calls the REST backend with a shared `reqwest::Client`. The client's timeout is
/// the only bound on a slow backend.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    health_url: String,
    refresh_url: String,
    me_url: String,
    login_url: String,
    logout_url: String,
}

impl HttpBackend {
    /// new
    ///
    /// Derives every endpoint URL from the injected configuration.
    pub fn new(client: reqwest::Client, config: &AppConfig) -> Self {
        Self {
            client,
            health_url: config.health_url(),
            refresh_url: config.refresh_url(),
            me_url: config.me_url(),
            login_url: config.login_url(),
            logout_url: config.logout_url(),
        }
    }

    async fn probe(&self) -> Result<SystemStatus, BackendError> {
        let response = self.client.get(&self.health_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Rejected {
                status: convert_status(status),
                body: serde_json::Value::Null,
            });
        }
        let body = response.json::<HealthResponse>().await?;
        Ok(SystemStatus::from_health(body))
    }
}

#[async_trait]
impl BackendService for HttpBackend {
    async fn check_health(&self) -> SystemStatus {
        match self.probe().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "health probe failed; treating backend as down");
                SystemStatus::unhealthy()
            }
        }
    }

    async fn refresh_access(&self, refresh: &str) -> Result<String, BackendError> {
        let response = self
            .client
            .post(&self.refresh_url)
            .header(header::COOKIE, format!("refresh={};", refresh))
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let body = response.json::<RefreshResponse>().await?;
        body.access
            .filter(|a| !a.is_empty())
            .ok_or(BackendError::MissingField("access"))
    }

    async fn fetch_user(&self, access: &str) -> Result<CurrentUser, BackendError> {
        let response = self
            .client
            .get(&self.me_url)
            .bearer_auth(access)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<CurrentUser>().await?)
    }

    async fn login(&self, credentials: &LoginRequest) -> Result<LoginOutcome, BackendError> {
        let response = self
            .client
            .post(&self.login_url)
            .json(credentials)
            .send()
            .await?;

        let response = ensure_success(response).await?;

        // The backend hands the refresh token out as an HttpOnly cookie.
        let cookie_refresh = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|raw| Cookie::parse(raw.to_string()).ok())
            .find(|cookie| cookie.name() == "refresh")
            .map(|cookie| cookie.value().to_string());

        let body = response.json::<BackendLoginResponse>().await?;

        Ok(LoginOutcome {
            access: body.access,
            refresh: cookie_refresh.or(body.refresh),
            user: body.user,
        })
    }

    async fn logout(&self, cookie_header: Option<&str>) -> Result<(), BackendError> {
        let response = self
            .client
            .post(&self.logout_url)
            .header(header::COOKIE, cookie_header.unwrap_or(""))
            .send()
            .await?;

        // Local cookies are cleared regardless, so a refusal is only worth a log line.
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "backend logout returned non-success");
        }
        Ok(())
    }
}

/// Converts a non-success response into `BackendError::Rejected`, keeping the JSON
/// body (when there is one) so callers can relay it.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .json::<serde_json::Value>()
        .await
        .unwrap_or(serde_json::Value::Null);
    Err(BackendError::Rejected {
        status: convert_status(status),
        body,
    })
}

fn convert_status(status: reqwest::StatusCode) -> StatusCode {
    StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY)
}

// 3. The Mock Implementation (For Tests)
/// MockBackend
///
/// An in-memory `BackendService` used by the unit and integration tests. It answers
/// from fixed fields and records the order of the calls it receives.
#[derive(Default)]
pub struct MockBackend {
    /// What the health probe reports.
    pub status: SystemStatus,
    /// Access token minted on refresh. `None` makes every refresh fail.
    pub access: Option<String>,
    /// When set, only this refresh token is accepted.
    pub accepted_refresh: Option<String>,
    /// User resolved for any access token. `None` makes the identity lookup fail.
    pub user: Option<CurrentUser>,
    /// Result of a login call; `None` rejects the credentials.
    pub login: Option<LoginOutcome>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockBackend {
    /// A healthy backend, not under maintenance, that rejects every session.
    pub fn healthy() -> Self {
        Self {
            status: SystemStatus {
                healthy: true,
                under_maintenance: false,
                date_of_online: None,
            },
            ..Default::default()
        }
    }

    /// A backend whose health probe fails.
    pub fn down() -> Self {
        Self {
            status: SystemStatus::unhealthy(),
            ..Default::default()
        }
    }

    /// A healthy backend under maintenance.
    pub fn maintenance() -> Self {
        let mut backend = Self::healthy();
        backend.status.under_maintenance = true;
        backend
    }

    /// Accepts any refresh token, minting `access` for a user with `role`.
    pub fn with_session(mut self, access: &str, role: &str) -> Self {
        self.access = Some(access.to_string());
        self.user = Some(CurrentUser {
            id: Some(1),
            username: Some(format!("{}-user", role)),
            role: Some(role.to_string()),
            ..Default::default()
        });
        self
    }

    /// The names of the calls received so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn rejected() -> BackendError {
        BackendError::Rejected {
            status: StatusCode::UNAUTHORIZED,
            body: serde_json::json!({ "detail": "Unauthorized" }),
        }
    }
}

#[async_trait]
impl BackendService for MockBackend {
    async fn check_health(&self) -> SystemStatus {
        self.record("health");
        self.status.clone()
    }

    async fn refresh_access(&self, refresh: &str) -> Result<String, BackendError> {
        self.record("refresh");
        if let Some(accepted) = &self.accepted_refresh {
            if accepted != refresh {
                return Err(Self::rejected());
            }
        }
        self.access.clone().ok_or_else(Self::rejected)
    }

    async fn fetch_user(&self, _access: &str) -> Result<CurrentUser, BackendError> {
        self.record("me");
        self.user.clone().ok_or_else(Self::rejected)
    }

    async fn login(&self, _credentials: &LoginRequest) -> Result<LoginOutcome, BackendError> {
        self.record("login");
        self.login.clone().ok_or_else(|| BackendError::Rejected {
            status: StatusCode::BAD_REQUEST,
            body: serde_json::json!({ "detail": "Invalid credentials" }),
        })
    }

    async fn logout(&self, _cookie_header: Option<&str>) -> Result<(), BackendError> {
        self.record("logout");
        Ok(())
    }
}
