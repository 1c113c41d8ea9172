//! HTTP API for the session service.
//!
//! # Modules
//!
//! - [`auth`]: Login, refresh, logout, session check and device list handlers
//! - [`middleware`]: `AuthUser` / `MaybeAuthUser` extractors and error mapping
//! - [`request_id`]: Request correlation ids
//!
//! # Endpoints Overview
//!
//! Every `/auth/*` route is also served under `/api/auth/*`.
//!
//! ```text
//! POST   /auth/login                   - Login, sets session cookies (public)
//! POST   /auth/refresh                 - Rotate the refresh token (public)
//! POST   /auth/logout                  - Revoke one or all sessions, clears cookies (public)
//! GET    /auth/check                   - Current user, 401 when anonymous
//! GET    /auth/status                  - Current user or anonymous, always 200
//! GET    /auth/sessions                - Caller's active sessions (auth required)
//! DELETE /auth/sessions/{token_id}     - Revoke one of the caller's sessions (auth required)
//! GET    /health                       - Health check
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use kiz_server::api::{AppState, create_router};
//! use kiz_session::auth::{CodecConfig, CookiePolicy, SessionManager, TokenCodec};
//! use kiz_session::db::{InMemoryTokenStore, InMemoryUserDirectory};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let codec = TokenCodec::new(CodecConfig::new(
//!     "access-secret-at-least-32-characters!!",
//!     "refresh-secret-at-least-32-characters!",
//! ));
//! let sessions = SessionManager::new(
//!     codec,
//!     Arc::new(InMemoryTokenStore::new()),
//!     Arc::new(InMemoryUserDirectory::new("pepper")),
//! );
//!
//! let app = create_router(AppState::new(sessions, CookiePolicy::default()));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod auth;
pub mod middleware;
pub mod request_id;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
};
use kiz_session::{
    SessionManager,
    auth::CookiePolicy,
    db::Database,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; everything heavy sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub cookies: Arc<CookiePolicy>,
    /// Present when sessions live in PostgreSQL; used by the health check
    pub database: Option<Database>,
}

impl AppState {
    pub fn new(sessions: SessionManager, cookies: CookiePolicy) -> Self {
        Self {
            sessions: Arc::new(sessions),
            cookies: Arc::new(cookies),
            database: None,
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/auth", auth_router())
        .nest("/api/auth", auth_router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/check", get(auth::check))
        .route("/status", get(auth::status))
        .route("/sessions", get(auth::list_sessions))
        .route("/sessions/{token_id}", delete(auth::revoke_session))
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the database answers (or no database is in use),
/// `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","version":"0.1.0","database":true,"timestamp":"2026-10-19T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.database {
        Some(db) => Some(db.health_check().await.is_ok()),
        None => None,
    };
    let healthy = database.unwrap_or(true);

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
