use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use axum_extra::extract::cookie::Cookie;
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use std::sync::Arc;
use tower::util::ServiceExt;
use trade_fair_gate::{
    AppConfig, AppState, BackendState, MockBackend, MockSite, SiteState,
    auth::AccessClaims,
    backend::LoginOutcome,
    create_router,
    models::{CurrentUser, LoginSuccess, Role, SessionView, SystemStatus},
};

fn app(backend: MockBackend) -> (Router, Arc<MockBackend>) {
    let backend = Arc::new(backend);
    let state = AppState {
        backend: backend.clone() as BackendState,
        site: Arc::new(MockSite) as SiteState,
        config: AppConfig::default(),
    };
    (create_router(state), backend)
}

fn login_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "username": "jane", "password": "secret" }).to_string(),
        ))
        .unwrap()
}

fn access_token(role: &str, lifetime_secs: i64) -> String {
    let claims = AccessClaims {
        user_id: Some(serde_json::json!(7)),
        username: Some("jane".into()),
        role: Some(role.into()),
        exp: Some(Utc::now().timestamp() + lifetime_secs),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"backend-signing-key"),
    )
    .unwrap()
}

fn set_cookies(response: &axum::http::Response<Body>) -> Vec<Cookie<'static>> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| Cookie::parse(v.to_str().unwrap().to_string()).unwrap())
        .collect()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::http::Response<Body>) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// --- Login ---

#[tokio::test]
async fn test_login_issues_session_cookies() {
    let access = access_token("manager", 3600);
    let mut backend = MockBackend::healthy();
    backend.login = Some(LoginOutcome {
        access: access.clone(),
        refresh: Some("refresh-1".to_string()),
        user: Some(CurrentUser {
            id: Some(7),
            username: Some("jane".into()),
            role: Some("manager".into()),
            ..Default::default()
        }),
    });
    let (app, _) = app(backend);

    let response = app.oneshot(login_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    let refresh = cookies.iter().find(|c| c.name() == "refresh").unwrap();
    assert_eq!(refresh.value(), "refresh-1");
    assert_eq!(refresh.http_only(), Some(true));

    let access_cookie = cookies.iter().find(|c| c.name() == "access").unwrap();
    assert_eq!(access_cookie.value(), access);
    assert_ne!(access_cookie.http_only(), Some(true));
    // Lifetime follows the token's exp claim.
    let max_age = access_cookie.max_age().unwrap().whole_seconds();
    assert!(max_age > 3500 && max_age <= 3600);

    // Legacy cookie names are never issued.
    assert!(cookies.iter().all(|c| c.name() != "accessToken" && c.name() != "refreshToken"));

    let body: LoginSuccess = body_json(response).await;
    assert!(body.success);
    assert_eq!(body.user.and_then(|u| u.role()), Some(Role::Manager));
}

#[tokio::test]
async fn test_login_rejection_is_relayed() {
    let (app, _) = app(MockBackend::healthy());

    let response = app.oneshot(login_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(set_cookies(&response).iter().all(|c| c.name() != "refresh"));

    let body: serde_json::Value = body_json(response).await;
    assert_eq!(body["detail"], "Invalid credentials");
}

// --- Session Introspection ---

#[tokio::test]
async fn test_session_endpoint_reports_role_navigation() {
    let (app, _) = app(MockBackend::healthy().with_session("abc", "admin"));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/session")
                .header(header::COOKIE, "refresh=valid-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let view: SessionView = body_json(response).await;
    assert_eq!(view.role, Some(Role::Admin));
    assert_eq!(view.home_route, "/admin");
    assert_eq!(view.dashboard_title.as_deref(), Some("Admin Dashboard"));
    assert!(view.tabs.iter().any(|t| t == "manage-team"));
}

#[tokio::test]
async fn test_session_endpoint_without_session() {
    let (app, _) = app(MockBackend::healthy());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_endpoint_mirrors_probe() {
    let (app, _) = app(MockBackend::healthy());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let status: SystemStatus = body_json(response).await;
    assert!(status.healthy);
    assert!(!status.under_maintenance);
}

// --- Logout ---

#[tokio::test]
async fn test_logout_clears_both_cookies() {
    let (app, backend) = app(MockBackend::healthy());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/logout/")
                .header(header::COOKIE, "refresh=valid-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(backend.calls(), vec!["logout"]);

    let cookies = set_cookies(&response);
    for name in ["refresh", "access"] {
        let cookie = cookies.iter().find(|c| c.name() == name).unwrap();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.path(), Some("/"));
    }

    let body: serde_json::Value = body_json(response).await;
    assert_eq!(body["message"], "Logged out");
}
