//! Integration tests for the session HTTP endpoints.
//!
//! Drives the router in-process with `oneshot`, backed by in-memory stores
//! and a manual clock.

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use kiz_server::api::{AppState, create_router};
use kiz_session::auth::{AuthUser, CodecConfig, CookiePolicy, ManualClock, SessionManager, TokenCodec};
use kiz_session::db::{InMemoryTokenStore, InMemoryUserDirectory};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method

const PASSWORD: &str = "correct";

struct TestServer {
    app: axum::Router,
    store: Arc<InMemoryTokenStore>,
    clock: Arc<ManualClock>,
}

/// Helper to create test server with two users
async fn create_test_server() -> TestServer {
    let store = Arc::new(InMemoryTokenStore::new());
    let users = Arc::new(InMemoryUserDirectory::new("test_pepper"));
    let clock = Arc::new(ManualClock::new(Utc::now()));

    for (id, email) in [("u1", "a@b.com"), ("u2", "c@d.com")] {
        users
            .add_user(
                AuthUser {
                    id: id.to_string(),
                    email: email.to_string(),
                    nickname: format!("nick-{id}"),
                    avatar: None,
                    verified: true,
                },
                PASSWORD,
            )
            .await
            .unwrap();
    }

    let codec = TokenCodec::new(CodecConfig::new(
        "access-secret-for-tests-0123456789abcdef",
        "refresh-secret-for-tests-0123456789abcdef",
    ));
    let sessions = SessionManager::new(codec, store.clone(), users).with_clock(clock.clone());
    let app = create_router(AppState::new(sessions, CookiePolicy::default()));

    TestServer { app, store, clock }
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestResponse {
    fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    /// `Cookie` request header value replaying every cookie that was set
    fn cookie_header(&self) -> String {
        self.set_cookies()
            .iter()
            .map(|c| c.split(';').next().unwrap().to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn token(&self, field: &str) -> String {
        self.body["tokens"][field].as_str().unwrap().to_string()
    }
}

async fn send(server: &TestServer, request: Request<Body>) -> TestResponse {
    let response = server.app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_with_bearer(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn login(server: &TestServer, email: &str) -> TestResponse {
    let response = send(
        server,
        post_json("/auth/login", json!({"email": email, "password": PASSWORD})),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    response
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_sets_http_only_cookies() {
    let server = create_test_server().await;

    let response = login(&server, "a@b.com").await;

    assert_eq!(response.body["tokens"]["expiresIn"], 900);
    assert_eq!(response.body["user"]["id"], "u1");
    assert_eq!(response.body["user"]["email"], "a@b.com");

    let cookies = response.set_cookies();
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|c| c.contains("HttpOnly")));
    assert!(cookies.iter().all(|c| c.contains("Path=/")));
    assert!(cookies.iter().all(|c| !c.contains("Secure")));

    let access = cookies.iter().find(|c| c.starts_with("accessToken=")).unwrap();
    assert!(access.contains("Max-Age=900"));
    assert!(access.contains(&response.token("accessToken")));

    let refresh = cookies.iter().find(|c| c.starts_with("refreshToken=")).unwrap();
    assert!(refresh.contains("Max-Age=604800"));
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let server = create_test_server().await;

    let response = send(
        &server,
        post_json("/auth/login", json!({"email": "a@b.com", "password": "wrong"})),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Invalid credentials");
    assert!(response.set_cookies().is_empty());
    assert!(server.store.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_login_with_unknown_email_looks_the_same() {
    let server = create_test_server().await;

    let response = send(
        &server,
        post_json("/auth/login", json!({"email": "nobody@b.com", "password": PASSWORD})),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Invalid credentials");
}

#[tokio::test]
async fn test_login_with_missing_fields() {
    let server = create_test_server().await;

    let response = send(&server, post_json("/auth/login", json!({"email": "a@b.com"}))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "password is required");

    let garbage = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .body(Body::from("not json"))
        .unwrap();
    let response = send(&server, garbage).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "email is required");
}

// ============================================================================
// Check
// ============================================================================

#[tokio::test]
async fn test_check_without_token() {
    let server = create_test_server().await;
    server.store.set_offline(true);

    // No token means no store access, so an offline store does not matter
    let request = Request::builder()
        .uri("/auth/check")
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["authenticated"], false);
    assert_eq!(response.body["error"], "No token provided");
}

#[tokio::test]
async fn test_check_with_bearer_and_cookie() {
    let server = create_test_server().await;
    let login = login(&server, "a@b.com").await;

    let response = send(
        &server,
        get_with_bearer("/auth/check", &login.token("accessToken")),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["authenticated"], true);
    assert_eq!(response.body["user"]["nickname"], "nick-u1");

    let request = Request::builder()
        .uri("/auth/check")
        .header(header::COOKIE, login.cookie_header())
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_check_with_garbage_token() {
    let server = create_test_server().await;

    let response = send(&server, get_with_bearer("/auth/check", "garbage")).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Invalid token");
}

#[tokio::test]
async fn test_check_with_storage_down() {
    let server = create_test_server().await;
    let login = login(&server, "a@b.com").await;
    server.store.set_offline(true);

    let response = send(
        &server,
        get_with_bearer("/auth/check", &login.token("accessToken")),
    )
    .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["error"], "Internal server error");
}

#[tokio::test]
async fn test_status_serves_anonymous_callers() {
    let server = create_test_server().await;

    let request = Request::builder()
        .uri("/auth/status")
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["authenticated"], false);
    assert_eq!(response.body["user"], Value::Null);

    let login = login(&server, "a@b.com").await;
    let response = send(
        &server,
        get_with_bearer("/auth/status", &login.token("accessToken")),
    )
    .await;
    assert_eq!(response.body["authenticated"], true);
    assert_eq!(response.body["user"]["id"], "u1");
}

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test]
async fn test_expired_access_token_then_cookie_refresh() {
    let server = create_test_server().await;
    let login = login(&server, "a@b.com").await;

    server.clock.advance(Duration::minutes(16));
    let response = send(
        &server,
        get_with_bearer("/auth/check", &login.token("accessToken")),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Token not found or expired");

    server.clock.advance(Duration::days(6));
    let request = Request::builder()
        .method("POST")
        .uri("/auth/refresh")
        .header(header::COOKIE, login.cookie_header())
        .body(Body::empty())
        .unwrap();
    let refreshed = send(&server, request).await;

    assert_eq!(refreshed.status, StatusCode::OK);
    assert_eq!(refreshed.body["tokens"]["expiresIn"], 900);
    assert_ne!(refreshed.token("refreshToken"), login.token("refreshToken"));
    assert_eq!(refreshed.set_cookies().len(), 2);

    let response = send(
        &server,
        get_with_bearer("/auth/check", &refreshed.token("accessToken")),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_cookies_in_separate_header_fields() {
    let server = create_test_server().await;
    let login = login(&server, "a@b.com").await;

    let request = Request::builder()
        .method("POST")
        .uri("/auth/refresh")
        .header(header::COOKIE, "theme=dark")
        .header(
            header::COOKIE,
            format!("refreshToken={}", login.token("refreshToken")),
        )
        .body(Body::empty())
        .unwrap();
    let refreshed = send(&server, request).await;
    assert_eq!(refreshed.status, StatusCode::OK);

    let request = Request::builder()
        .uri("/auth/check")
        .header(header::COOKIE, "theme=dark")
        .header(
            header::COOKIE,
            format!("accessToken={}", refreshed.token("accessToken")),
        )
        .body(Body::empty())
        .unwrap();
    let check = send(&server, request).await;
    assert_eq!(check.status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_replay_is_rejected() {
    let server = create_test_server().await;
    let login = login(&server, "a@b.com").await;
    let body = json!({"refreshToken": login.token("refreshToken")});

    let first = send(&server, post_json("/auth/refresh", body.clone())).await;
    assert_eq!(first.status, StatusCode::OK);

    let replay = send(&server, post_json("/auth/refresh", body)).await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay.body["error"], "Invalid or expired refresh token");
}

#[tokio::test]
async fn test_refresh_body_takes_precedence_over_cookie() {
    let server = create_test_server().await;
    let alice = login(&server, "a@b.com").await;
    let bob = login(&server, "c@d.com").await;

    let request = Request::builder()
        .method("POST")
        .uri("/auth/refresh")
        .header(header::COOKIE, alice.cookie_header())
        .body(Body::from(
            json!({"refreshToken": bob.token("refreshToken")}).to_string(),
        ))
        .unwrap();
    let refreshed = send(&server, request).await;
    assert_eq!(refreshed.status, StatusCode::OK);

    let check = send(
        &server,
        get_with_bearer("/auth/check", &refreshed.token("accessToken")),
    )
    .await;
    assert_eq!(check.body["user"]["id"], "u2");
}

#[tokio::test]
async fn test_refresh_json_body_without_field_ignores_cookie() {
    let server = create_test_server().await;
    let login = login(&server, "a@b.com").await;

    let request = Request::builder()
        .method("POST")
        .uri("/auth/refresh")
        .header(header::COOKIE, login.cookie_header())
        .body(Body::from("{}"))
        .unwrap();
    let response = send(&server, request).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Refresh token required");
}

#[tokio::test]
async fn test_refresh_with_access_token_is_rejected() {
    let server = create_test_server().await;
    let login = login(&server, "a@b.com").await;

    let response = send(
        &server,
        post_json(
            "/auth/refresh",
            json!({"refreshToken": login.token("accessToken")}),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Invalid refresh token");
}

// ============================================================================
// Logout
// ============================================================================

#[tokio::test]
async fn test_logout_with_cookies_clears_them() {
    let server = create_test_server().await;
    let login = login(&server, "a@b.com").await;

    let request = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(header::COOKIE, login.cookie_header())
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    assert_eq!(response.body["revoked"], 1);
    let cleared = response.set_cookies();
    assert_eq!(cleared.len(), 2);
    assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));

    let check = send(
        &server,
        get_with_bearer("/auth/check", &login.token("accessToken")),
    )
    .await;
    assert_eq!(check.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let server = create_test_server().await;
    let login = login(&server, "a@b.com").await;
    let body = json!({"refreshToken": login.token("refreshToken")});

    let first = send(&server, post_json("/auth/logout", body.clone())).await;
    let second = send(&server, post_json("/auth/logout", body)).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["revoked"], 0);
}

#[tokio::test]
async fn test_logout_with_bearer_header_only() {
    let server = create_test_server().await;
    let login = login(&server, "a@b.com").await;

    let request = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", login.token("accessToken")),
        )
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["revoked"], 1);
}

#[tokio::test]
async fn test_logout_without_any_token() {
    let server = create_test_server().await;

    let response = send(&server, post_json("/auth/logout", json!({}))).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "No token provided");
    assert_eq!(response.set_cookies().len(), 2);
}

#[tokio::test]
async fn test_logout_all_only_touches_own_sessions() {
    let server = create_test_server().await;
    let laptop = login(&server, "a@b.com").await;
    let phone = login(&server, "a@b.com").await;
    let other = login(&server, "c@d.com").await;

    let response = send(
        &server,
        post_json(
            "/auth/logout",
            json!({"refreshToken": laptop.token("refreshToken"), "logoutAll": true}),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["revoked"], 2);

    let phone_check = send(
        &server,
        get_with_bearer("/auth/check", &phone.token("accessToken")),
    )
    .await;
    assert_eq!(phone_check.status, StatusCode::UNAUTHORIZED);

    let other_check = send(
        &server,
        get_with_bearer("/auth/check", &other.token("accessToken")),
    )
    .await;
    assert_eq!(other_check.status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_storage_failure_still_clears_cookies() {
    let server = create_test_server().await;
    let login = login(&server, "a@b.com").await;
    server.store.set_offline(true);

    let response = send(
        &server,
        post_json(
            "/auth/logout",
            json!({"refreshToken": login.token("refreshToken")}),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.set_cookies().iter().all(|c| c.contains("Max-Age=0")));
}

// ============================================================================
// Device list
// ============================================================================

#[tokio::test]
async fn test_list_and_revoke_sessions() {
    let server = create_test_server().await;
    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::USER_AGENT, "test-browser")
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .body(Body::from(
            json!({"email": "a@b.com", "password": PASSWORD, "deviceId": "laptop"}).to_string(),
        ))
        .unwrap();
    let laptop = send(&server, request).await;
    let phone = login(&server, "a@b.com").await;

    let listed = send(
        &server,
        get_with_bearer("/auth/sessions", &phone.token("accessToken")),
    )
    .await;
    assert_eq!(listed.status, StatusCode::OK);
    let sessions = listed.body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);

    let laptop_session = sessions
        .iter()
        .find(|s| s["deviceId"] == "laptop")
        .unwrap();
    assert_eq!(laptop_session["userAgent"], "test-browser");
    assert_eq!(laptop_session["ipAddress"], "203.0.113.7");
    let token_id = laptop_session["tokenId"].as_str().unwrap();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/auth/sessions/{token_id}"))
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", phone.token("accessToken")),
        )
        .body(Body::empty())
        .unwrap();
    let revoked = send(&server, request).await;
    assert_eq!(revoked.status, StatusCode::NO_CONTENT);

    let check = send(
        &server,
        get_with_bearer("/auth/check", &laptop.token("accessToken")),
    )
    .await;
    assert_eq!(check.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cannot_revoke_someone_elses_session() {
    let server = create_test_server().await;
    let alice = login(&server, "a@b.com").await;
    let bob = login(&server, "c@d.com").await;

    let listed = send(
        &server,
        get_with_bearer("/auth/sessions", &bob.token("accessToken")),
    )
    .await;
    let token_id = listed.body["sessions"][0]["tokenId"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/auth/sessions/{token_id}"))
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", alice.token("accessToken")),
        )
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "Session not found");
}

#[tokio::test]
async fn test_sessions_require_authentication() {
    let server = create_test_server().await;

    let request = Request::builder()
        .uri("/auth/sessions")
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Routing and middleware
// ============================================================================

#[tokio::test]
async fn test_api_prefix_routes() {
    let server = create_test_server().await;

    let response = send(
        &server,
        post_json("/api/auth/login", json!({"email": "a@b.com", "password": PASSWORD})),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.set_cookies().len(), 2);
}

#[tokio::test]
async fn test_health_check_endpoint() {
    let server = create_test_server().await;

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["database"], Value::Null);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = create_test_server().await;

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "trace-me")
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;

    assert_eq!(response.headers.get("x-request-id").unwrap(), "trace-me");

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;
    assert!(response.headers.contains_key("x-request-id"));
}
