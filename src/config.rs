use std::env;

/// AppConfig
///
/// Holds the gate's entire configuration state. Loaded once at startup and shared
/// (immutably) with every request via `FromRef`. All collaborator base URLs live here
/// so the gate logic never reaches for ambient globals.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls log format and cookie hardening.
    pub env: Env,
    // Root of the REST backend; the health probe is a GET on this URL.
    pub backend_root: String,
    // Base of the REST API (token refresh, identity lookup, login).
    pub api_base: String,
    // Origin of the marketing site / dashboard that passed-through requests are relayed to.
    pub site_origin: String,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // Optional HS256 signing key of the backend's access tokens.
    // When absent, access token claims are read without signature verification.
    pub jwt_secret: Option<String>,
    // Upper bound for every outbound call (health, refresh, identity, relay).
    pub backend_timeout_secs: u64,
    // Marks issued cookies `Secure`.
    pub secure_cookies: bool,
}

/// Env
///
/// Defines the runtime context, used to switch between local development defaults
/// and the hardened production setup.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

const LOCAL_BACKEND_ROOT: &str = "http://localhost:8000";
const LOCAL_SITE_ORIGIN: &str = "http://localhost:3001";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

impl Default for AppConfig {
    /// default
    ///
    /// Provides a safe, non-panicking AppConfig instance primarily used for test setup.
    fn default() -> Self {
        Self {
            env: Env::Local,
            backend_root: LOCAL_BACKEND_ROOT.to_string(),
            api_base: format!("{}/api", LOCAL_BACKEND_ROOT),
            site_origin: LOCAL_SITE_ORIGIN.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            jwt_secret: None,
            backend_timeout_secs: DEFAULT_TIMEOUT_SECS,
            secure_cookies: false,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// The canonical function for initializing the gate configuration at startup.
    /// It reads all parameters from environment variables and implements the **fail-fast** principle.
    ///
    /// # Panics
    /// Panics in production if `BACKEND_ROOT` or `SITE_ORIGIN` is missing, or if
    /// `BACKEND_TIMEOUT_SECS` is set to something that is not a number of seconds.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let (backend_root, site_origin) = match env {
            Env::Production => (
                env::var("BACKEND_ROOT").expect("FATAL: BACKEND_ROOT required in prod"),
                env::var("SITE_ORIGIN").expect("FATAL: SITE_ORIGIN required in prod"),
            ),
            Env::Local => (
                env::var("BACKEND_ROOT").unwrap_or_else(|_| LOCAL_BACKEND_ROOT.to_string()),
                env::var("SITE_ORIGIN").unwrap_or_else(|_| LOCAL_SITE_ORIGIN.to_string()),
            ),
        };
        let backend_root = trim_slash(backend_root);
        let site_origin = trim_slash(site_origin);

        // The API conventionally lives under `/api` of the backend root.
        let api_base = env::var("API_BASE_URL")
            .map(trim_slash)
            .unwrap_or_else(|_| format!("{}/api", backend_root));

        let backend_timeout_secs = match env::var("BACKEND_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse()
                .expect("FATAL: BACKEND_TIMEOUT_SECS must be a whole number of seconds"),
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Self {
            secure_cookies: env == Env::Production,
            env,
            backend_root,
            api_base,
            site_origin,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            jwt_secret: env::var("JWT_SIGNING_KEY").ok().filter(|s| !s.is_empty()),
            backend_timeout_secs,
        }
    }

    /// Health probe target.
    pub fn health_url(&self) -> String {
        format!("{}/", self.backend_root)
    }

    pub fn refresh_url(&self) -> String {
        format!("{}/token/refresh-cookie/", self.api_base)
    }

    pub fn me_url(&self) -> String {
        format!("{}/me/", self.api_base)
    }

    pub fn login_url(&self) -> String {
        format!("{}/login/", self.api_base)
    }

    // Django routes require the trailing slash.
    pub fn logout_url(&self) -> String {
        format!("{}/api/logout/", self.backend_root)
    }
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
