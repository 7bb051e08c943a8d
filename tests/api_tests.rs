use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use trade_fair_gate::{
    AppConfig, AppState, BackendState, HttpBackend, HttpSite, SiteState, create_router,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct TestApp {
    pub address: String,
    pub backend: MockServer,
    pub site: MockServer,
}

/// Runs the real gate (HTTP collaborators included) against two mock servers
/// standing in for the REST backend and the site.
async fn spawn_app() -> TestApp {
    let backend_server = MockServer::start().await;
    let site_server = MockServer::start().await;

    let config = AppConfig {
        backend_root: backend_server.uri(),
        api_base: format!("{}/api", backend_server.uri()),
        site_origin: site_server.uri(),
        backend_timeout_secs: 2,
        ..AppConfig::default()
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.backend_timeout_secs))
        .build()
        .unwrap();
    let backend = Arc::new(HttpBackend::new(client, &config)) as BackendState;
    let site = Arc::new(HttpSite::new(&config.site_origin, config.backend_timeout_secs).unwrap())
        as SiteState;

    let router = create_router(AppState {
        backend,
        site,
        config,
    });

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        backend: backend_server,
        site: site_server,
    }
}

async fn mount_health(app: &TestApp, under_maintenance: bool) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "db": "ok",
            "under_maintenance": under_maintenance,
            "date_of_online": null
        })))
        .mount(&app.backend)
        .await;
}

/// A browser-like client that shows redirects instead of following them.
fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

fn set_cookie_values(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Sends `target` exactly as written. reqwest would resolve dot segments itself.
async fn raw_get(address: &str, target: &str) -> (u16, Option<String>) {
    let host = address.trim_start_matches("http://");
    let mut stream = TcpStream::connect(host).await.unwrap();
    let request = format!("GET {target} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8_lossy(&raw);

    let status = text.split_whitespace().nth(1).unwrap().parse().unwrap();
    let location = text.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.eq_ignore_ascii_case("location")
            .then(|| value.trim().to_string())
    });
    (status, location)
}

#[tokio::test]
async fn test_sales_user_on_admin_end_to_end() {
    let app = spawn_app().await;
    mount_health(&app, false).await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh-cookie/"))
        .and(header("cookie", "refresh=valid-token;"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "abc" })))
        .mount(&app.backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/me/"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "role": "sales" })))
        .mount(&app.backend)
        .await;

    let response = client()
        .get(format!("{}/admin", app.address))
        .header("cookie", "refresh=valid-token")
        .send()
        .await
        .expect("req fail");

    assert_eq!(response.status(), 307);
    assert_eq!(response.headers()["location"], "/sales");
    let cookies = set_cookie_values(&response);
    assert!(cookies.iter().any(|c| c.starts_with("access=abc")));
    assert!(cookies.iter().any(|c| c.starts_with("backend_healthy=true")));
    assert!(cookies.iter().any(|c| c.starts_with("under_maintenance=false")));
}

#[tokio::test]
async fn test_public_page_is_relayed_to_site() {
    let app = spawn_app().await;
    mount_health(&app, false).await;
    Mock::given(method("GET"))
        .and(path("/gallery"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<h1>Gallery</h1>"),
        )
        .mount(&app.site)
        .await;

    let response = client()
        .get(format!("{}/gallery", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(
        set_cookie_values(&response)
            .iter()
            .any(|c| c.starts_with("backend_healthy=true"))
    );
    assert_eq!(response.text().await.unwrap(), "<h1>Gallery</h1>");
}

#[tokio::test]
async fn test_site_redirects_are_not_followed() {
    let app = spawn_app().await;
    mount_health(&app, false).await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(ResponseTemplate::new(308).insert_header("location", "/about-us"))
        .mount(&app.site)
        .await;

    let response = client()
        .get(format!("{}/about", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 308);
    assert_eq!(response.headers()["location"], "/about-us");
}

#[tokio::test]
async fn test_unreachable_backend_closes_site() {
    let app = spawn_app().await;
    // No health mock mounted: the backend answers 404.

    let response = client()
        .get(format!("{}/visitors", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 307);
    assert_eq!(response.headers()["location"], "/");
    assert!(
        set_cookie_values(&response)
            .iter()
            .any(|c| c.starts_with("backend_healthy=false"))
    );
}

#[tokio::test]
async fn test_maintenance_closes_public_pages() {
    let app = spawn_app().await;
    mount_health(&app, true).await;

    let response = client()
        .get(format!("{}/visitors", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 307);
    assert_eq!(response.headers()["location"], "/");
}

#[tokio::test]
async fn test_non_canonical_admin_paths_never_reach_site() {
    let app = spawn_app().await;
    mount_health(&app, false).await;
    Mock::given(method("GET"))
        .and(path("/admin"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ADMIN DASHBOARD"))
        .expect(0)
        .mount(&app.site)
        .await;

    for (target, canonical) in [
        ("/x/../admin", "/admin"),
        ("/./admin", "/admin"),
        ("//admin", "/admin"),
        ("/%61dmin", "/admin"),
        ("/admin%2Fevents", "/admin/events"),
    ] {
        let (status, location) = raw_get(&app.address, target).await;
        assert_eq!(status, 307, "{target}");
        assert_eq!(location.as_deref(), Some(canonical), "{target}");
    }

    // The canonical form is then gated like any dashboard path.
    let (status, location) = raw_get(&app.address, "/admin").await;
    assert_eq!(status, 307);
    assert_eq!(location.as_deref(), Some("/"));
}

#[tokio::test]
async fn test_stalled_health_probe_closes_site() {
    let app = spawn_app().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "ok", "under_maintenance": false }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&app.backend)
        .await;

    let response = client()
        .get(format!("{}/visitors", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 307);
    assert_eq!(response.headers()["location"], "/");
    assert!(
        set_cookie_values(&response)
            .iter()
            .any(|c| c.starts_with("backend_healthy=false"))
    );
}

#[tokio::test]
async fn test_stalled_refresh_ends_session() {
    let app = spawn_app().await;
    mount_health(&app, false).await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh-cookie/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access": "abc" }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&app.backend)
        .await;

    let response = client()
        .get(format!("{}/sales", app.address))
        .header("cookie", "refresh=valid-token")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 307);
    assert_eq!(response.headers()["location"], "/");
    let cookies = set_cookie_values(&response);
    assert!(cookies.iter().any(|c| c.starts_with("refresh=;")));
    assert!(!cookies.iter().any(|c| c.starts_with("access=abc")));
}
