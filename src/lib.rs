use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core gate and its collaborators.
pub mod auth;
pub mod backend;
pub mod config;
pub mod gate;
pub mod handlers;
pub mod models;
pub mod site;

// Locally served endpoints (everything else is relayed to the site).
pub mod routes;
use routes::{public, session};

// --- Public Re-exports ---

pub use backend::{BackendState, HttpBackend, MockBackend};
pub use config::AppConfig;
pub use site::{HttpSite, MockSite, SiteState};

/// ApiDoc
///
/// OpenAPI description of the endpoints the gate serves itself, published at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::logout, handlers::get_status, handlers::get_session
    ),
    components(
        schemas(
            models::LoginRequest, models::LoginSuccess, models::CurrentUser,
            models::SystemStatus, models::SessionView, models::Role,
        )
    ),
    tags(
        (name = "trade-fair-gate", description = "Edge access gate of the trade-fair site")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, immutable container shared by every request: the two collaborators
/// behind trait objects plus the loaded configuration.
#[derive(Clone)]
pub struct AppState {
    /// REST backend: health, token refresh, identity, login/logout.
    pub backend: BackendState,
    /// Upstream site that passed-through requests are relayed to.
    pub site: SiteState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for BackendState {
    fn from_ref(app_state: &AppState) -> BackendState {
        app_state.backend.clone()
    }
}

impl FromRef<AppState> for SiteState {
    fn from_ref(app_state: &AppState) -> SiteState {
        app_state.site.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the local routes and the site fallback, puts the whole thing behind
/// the gate, then wraps it in the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let gated = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(session::session_routes())
        .fallback(handlers::forward_to_site)
        // `layer` (not `route_layer`) so the fallback is gated too.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::gate_middleware,
        ))
        .with_state(state);

    gated
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for every request, correlated by the generated `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
