use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use trade_fair_gate::{
    AppState, BackendState, HttpBackend, HttpSite, SiteState,
    config::{AppConfig, Env},
    create_router,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, the two collaborators, then the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise verbose gate logs and request-level tower_http logs.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "trade_fair_gate=debug,tower_http=info".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Gate starting in {:?} mode", config.env);
    tracing::info!(
        backend = %config.backend_root,
        api = %config.api_base,
        site = %config.site_origin,
        "collaborators configured"
    );

    // 4. Backend Collaborator
    // One shared client; its timeout bounds every health/refresh/identity call.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.backend_timeout_secs))
        .build()
        .expect("FATAL: Failed to build the backend HTTP client.");
    let backend = Arc::new(HttpBackend::new(client, &config)) as BackendState;

    // 5. Site Relay
    let site = HttpSite::new(&config.site_origin, config.backend_timeout_secs)
        .expect("FATAL: Failed to build the site relay client.");
    let site = Arc::new(site) as SiteState;

    // 6. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        backend,
        site,
        config,
    };

    // 7. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the listen address. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
