use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;

/// Largest request body relayed to the site.
const MAX_RELAY_BODY: usize = 10 * 1024 * 1024;

// 1. SiteService Contract
/// SiteService
///
/// The upstream that serves the marketing pages and dashboards. Every request the
/// gate lets through (and no local route claims) ends up here.
#[async_trait]
pub trait SiteService: Send + Sync {
    async fn forward(&self, request: Request) -> Response;
}

/// SiteState
///
/// The concrete type used to share the site relay across the application state.
pub type SiteState = Arc<dyn SiteService>;

// 2. The Real Implementation (HTTP relay)
/// HttpSite
///
/// Relays requests to the site origin with reqwest. Redirects issued by the site are
/// passed back to the browser untouched rather than followed.
#[derive(Clone)]
pub struct HttpSite {
    client: reqwest::Client,
    origin: String,
}

impl HttpSite {
    /// new
    ///
    /// Builds a dedicated client: no redirect following, bounded by `timeout_secs`.
    pub fn new(origin: &str, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            origin: origin.trim_end_matches('/').to_string(),
        })
    }

    async fn relay(&self, request: Request) -> Result<Response, RelayError> {
        let (parts, body) = request.into_parts();
        let body = to_bytes(body, MAX_RELAY_BODY)
            .await
            .map_err(|_| RelayError::BodyTooLarge)?;

        let target = format!(
            "{}{}",
            self.origin,
            parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/")
        );

        let mut headers = parts.headers;
        strip_hop_headers(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        let upstream = self
            .client
            .request(parts.method, target)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(RelayError::Upstream)?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_headers(&mut headers);
        let bytes = upstream.bytes().await.map_err(RelayError::Upstream)?;

        Ok((status, headers, bytes).into_response())
    }
}

enum RelayError {
    BodyTooLarge,
    Upstream(reqwest::Error),
}

fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in [
        header::CONNECTION,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
        header::TE,
        header::TRAILER,
        header::PROXY_AUTHORIZATION,
    ] {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

#[async_trait]
impl SiteService for HttpSite {
    async fn forward(&self, request: Request) -> Response {
        match self.relay(request).await {
            Ok(response) => response,
            Err(RelayError::BodyTooLarge) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
            }
            Err(RelayError::Upstream(e)) => {
                tracing::error!(error = %e, "site relay failed");
                (StatusCode::BAD_GATEWAY, "Site unavailable").into_response()
            }
        }
    }
}

// 3. The Mock Implementation (For Tests)
/// MockSite
///
/// Answers every forwarded request with `site:<METHOD> <path?query>` so tests can
/// see exactly what reached the upstream.
#[derive(Clone, Default)]
pub struct MockSite;

#[async_trait]
impl SiteService for MockSite {
    async fn forward(&self, request: Request) -> Response {
        let target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let body = format!("site:{} {}", request.method(), target);
        Response::new(Body::from(body))
    }
}
