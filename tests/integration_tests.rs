//! Integration tests for the full router: sessions, gates, impersonation,
//! rate limiting and timing.
//!
//! Most tests drive `build_router` in-process with `tower::ServiceExt::oneshot`.
//! Requests sent that way carry no peer address, so they all share the
//! rate limiter's `"unknown"` bucket unless proxy headers are trusted.
//! `test_live_server_login_flow` serves the router on an ephemeral port and
//! talks to it over HTTP with `reqwest`.
//!
//! Run with: `cargo test --test integration_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, RETRY_AFTER, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use dojo_auth::models::SessionView;
use dojo_auth::services::StaticAccounts;
use dojo_auth::{AppState, Config, Role, build_router};

const ADMIN_EMAIL: &str = "sensei@dojo.example";
const ADMIN_PASSWORD: &str = "kiai-admin";
const COACH_EMAIL: &str = "coach@dojo.example";
const COACH_PASSWORD: &str = "kiai-coach";
const MEMBER_EMAIL: &str = "student@dojo.example";
const MEMBER_PASSWORD: &str = "kiai-member";

// ============================================================================
// Fixtures
// ============================================================================

/// Configuration with rate limiting relaxed enough not to interfere.
fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        rate_limit_capacity: 1000,
        rate_limit_interval: Duration::from_secs(60),
        metrics_port: 0,
        ..Config::default()
    }
}

fn accounts() -> StaticAccounts {
    StaticAccounts::new()
        .with_account("admin-1", ADMIN_EMAIL, Role::Admin, ADMIN_PASSWORD)
        .with_account("coach-1", COACH_EMAIL, Role::Coach, COACH_PASSWORD)
        .with_account("member-1", MEMBER_EMAIL, Role::Member, MEMBER_PASSWORD)
}

fn app_with(config: Config) -> (Router, AppState) {
    let state = AppState::new(config, Arc::new(accounts())).expect("Failed to build state");
    (build_router(state.clone()), state)
}

fn app() -> Router {
    app_with(test_config()).0
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn login_request(email: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/login")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("email={email}&password={password}")))
        .unwrap()
}

/// `name=value` pair from the response's `Set-Cookie` header.
fn session_cookie(response: &Response<Body>) -> String {
    let set_cookie = response
        .headers()
        .get(SET_COOKIE)
        .expect("Set-Cookie missing")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(login_request(email, password))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER, "login failed");
    session_cookie(&response)
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

// ============================================================================
// Health & Readiness
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let response = send(&app(), get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["active_sessions"], 0);
    assert!(body.get("version").is_some());
    assert!(body.get("timestamp").is_some());
}

#[tokio::test]
async fn test_readiness_flips_on_shutdown() {
    let (app, state) = app_with(test_config());

    let response = send(&app, get("/ready", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    state.begin_shutdown();
    let response = send(&app, get("/ready", None)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Health keeps answering 200 while draining
    let response = send(&app, get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    state.shutdown().await;
}

#[tokio::test]
async fn test_request_id_added_to_response() {
    let response = send(&app(), get("/health", None)).await;
    assert!(response.headers().contains_key("x-request-id"));
}

// ============================================================================
// Login / Logout
// ============================================================================

#[tokio::test]
async fn test_login_sets_session_cookie() {
    let response = send(&app(), login_request(MEMBER_EMAIL, MEMBER_PASSWORD)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(LOCATION).unwrap(), "/");

    let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.starts_with("session="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Strict"));
    assert!(set_cookie.contains("Path=/"));
    assert!(set_cookie.contains("Max-Age=86400"));
    assert!(!set_cookie.contains("Secure"));

    let token = session_cookie(&response).trim_start_matches("session=").to_string();
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn test_me_returns_session_view() {
    let app = app();
    let cookie = login(&app, MEMBER_EMAIL, MEMBER_PASSWORD).await;

    let response = send(&app, get("/me", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let view: SessionView = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(view.account_id, "member-1");
    assert_eq!(view.email, MEMBER_EMAIL);
    assert_eq!(view.role, Role::Member);
    assert!(!view.impersonating);
}

#[tokio::test]
async fn test_login_wrong_password() {
    let response = send(&app(), login_request(MEMBER_EMAIL, "wrong")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(SET_COOKIE).is_none());

    let body = body_json(response).await;
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_login_invalid_email() {
    let response = send(&app(), login_request("not-an-email", "whatever")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_login_throttled_after_failures() {
    let config = Config {
        login_failure_limit: 10,
        login_failure_burst: 2,
        ..test_config()
    };
    let (app, _state) = app_with(config);

    // One failed attempt spends both cells of the burst
    let response = send(&app, login_request(MEMBER_EMAIL, "wrong")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, login_request(MEMBER_EMAIL, MEMBER_PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(RETRY_AFTER));
}

#[tokio::test]
async fn test_logout_ends_session() {
    let (app, state) = app_with(test_config());
    let cookie = login(&app, MEMBER_EMAIL, MEMBER_PASSWORD).await;
    assert_eq!(state.sessions.len(), 1);

    let request = Request::builder()
        .method("POST")
        .uri("/logout")
        .header(COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(LOCATION).unwrap(), "/login");
    let cleared = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.starts_with("session=;"));
    assert!(cleared.contains("Max-Age=-1"));
    assert!(state.sessions.is_empty());

    // The old cookie no longer authenticates
    let response = send(&app, get("/me", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_relogin_replaces_previous_session() {
    let (app, state) = app_with(test_config());
    let first = login(&app, MEMBER_EMAIL, MEMBER_PASSWORD).await;

    let mut request = login_request(MEMBER_EMAIL, MEMBER_PASSWORD);
    request
        .headers_mut()
        .insert(COOKIE, first.parse().unwrap());
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    assert_eq!(state.sessions.len(), 1);
    assert_ne!(session_cookie(&response), first);
}

// ============================================================================
// Authorization Gates
// ============================================================================

#[tokio::test]
async fn test_anonymous_redirected_to_login() {
    for uri in ["/me", "/coach", "/admin/perf"] {
        let response = send(&app(), get(uri, None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/login", "{uri}");
    }
}

#[tokio::test]
async fn test_malformed_cookie_treated_as_anonymous() {
    let response = send(&app(), get("/me", Some("session=not-a-token"))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_coach_gate() {
    let app = app();

    let member = login(&app, MEMBER_EMAIL, MEMBER_PASSWORD).await;
    let response = send(&app, get("/coach", Some(&member))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.headers().get(LOCATION).is_none());

    for (email, password) in [(COACH_EMAIL, COACH_PASSWORD), (ADMIN_EMAIL, ADMIN_PASSWORD)] {
        let cookie = login(&app, email, password).await;
        let response = send(&app, get("/coach", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::OK, "{email}");
    }
}

#[tokio::test]
async fn test_admin_gate_forbids_coach() {
    let app = app();
    let coach = login(&app, COACH_EMAIL, COACH_PASSWORD).await;

    let response = send(&app, get("/admin/perf", Some(&coach))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ============================================================================
// Impersonation
// ============================================================================

#[tokio::test]
async fn test_impersonation_round_trip() {
    let app = app();
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = send(
        &app,
        post_json("/admin/impersonate", Some(&admin), json!({"role": "member"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view: SessionView = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(view.role, Role::Member);
    assert_eq!(view.real_role, Role::Admin);
    assert!(view.impersonating);

    // Gates now see a member
    let response = send(&app, get("/coach", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = send(&app, get("/admin/perf", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The real admin can still leave
    let response = send(
        &app,
        post_json("/impersonation/exit", Some(&admin), json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view: SessionView = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(view.role, Role::Admin);
    assert!(!view.impersonating);

    let response = send(&app, get("/admin/perf", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cannot_impersonate_admin() {
    let app = app();
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = send(
        &app,
        post_json("/admin/impersonate", Some(&admin), json!({"role": "admin"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        post_json("/admin/impersonate", Some(&admin), json!({"role": "shihan"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_member_cannot_impersonate_or_exit() {
    let app = app();
    let member = login(&app, MEMBER_EMAIL, MEMBER_PASSWORD).await;

    let response = send(
        &app,
        post_json("/admin/impersonate", Some(&member), json!({"role": "trial"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &app,
        post_json("/impersonation/exit", Some(&member), json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_exit_without_impersonation_is_noop() {
    let app = app();
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = send(
        &app,
        post_json("/impersonation/exit", Some(&admin), json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view: SessionView = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(view.role, Role::Admin);
}

// ============================================================================
// Rate Limiting
// ============================================================================

#[tokio::test]
async fn test_rate_limit_exceeded() {
    let config = Config {
        rate_limit_capacity: 2,
        rate_limit_interval: Duration::from_secs(60),
        ..test_config()
    };
    let (app, _state) = app_with(config);

    for _ in 0..2 {
        let response = send(&app, get("/health", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = send(&app, get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "60");
    assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "2");
}

#[tokio::test]
async fn test_rate_limit_per_forwarded_ip() {
    let config = Config {
        rate_limit_capacity: 1,
        trust_proxy_headers: true,
        ..test_config()
    };
    let (app, _state) = app_with(config);

    let from = |ip: &str| {
        Request::builder()
            .uri("/health")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(send(&app, from("203.0.113.1")).await.status(), StatusCode::OK);
    assert_eq!(
        send(&app, from("203.0.113.1")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(send(&app, from("203.0.113.2")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_disabled() {
    let config = Config {
        rate_limit_capacity: 0,
        ..test_config()
    };
    let (app, state) = app_with(config);
    assert!(state.rate_limiter.is_none());

    for _ in 0..50 {
        let response = send(&app, get("/health", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

// ============================================================================
// Timing
// ============================================================================

#[tokio::test]
async fn test_perf_records_requests_but_not_static() {
    let (app, state) = app_with(test_config());

    send(&app, get("/health", None)).await;
    send(&app, get("/static/site.css", None)).await;
    send(&app, get("/favicon.ico", None)).await;

    let snapshot = state.perf.snapshot();
    assert_eq!(snapshot.total_requests, 1);
    assert_eq!(snapshot.recent[0].route, "GET /health");
    assert_eq!(snapshot.recent[0].status, 200);
}

#[tokio::test]
async fn test_admin_perf_snapshot() {
    let app = app();
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    send(&app, get("/health", None)).await;

    let response = send(&app, get("/admin/perf", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    // Login and health; the perf request itself is recorded after it returns
    assert_eq!(body["total_requests"], 2);
    assert_eq!(body["recent"][0]["route"], "GET /health");
    assert_eq!(body["recent"][1]["route"], "POST /login");
    assert_eq!(body["recent"][1]["status"], 303);
}

// ============================================================================
// Live Server
// ============================================================================

#[tokio::test]
async fn test_live_server_login_flow() {
    let (app, state) = app_with(test_config());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();
    let base_url = format!("http://{addr}");

    let response = client
        .post(format!("{base_url}/login"))
        .header(CONTENT_TYPE.as_str(), "application/x-www-form-urlencoded")
        .body(format!("email={COACH_EMAIL}&password={COACH_PASSWORD}"))
        .send()
        .await
        .expect("Login request failed");
    assert_eq!(response.status().as_u16(), 303);

    let cookie = response
        .headers()
        .get(SET_COOKIE.as_str())
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .expect("Set-Cookie missing")
        .to_string();

    let view: SessionView = client
        .get(format!("{base_url}/me"))
        .header(COOKIE.as_str(), &cookie)
        .send()
        .await
        .expect("Me request failed")
        .json()
        .await
        .expect("Failed to parse session view");
    assert_eq!(view.role, Role::Coach);

    // Real peer address is tracked by the limiter
    let health: Value = client
        .get(format!("{base_url}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["rate_limited_clients"], 1);
    assert_eq!(health["active_sessions"], 1);

    server.abort();
    state.shutdown().await;
}
