//! Session API handlers.
//!
//! This module provides the HTTP endpoints of the session lifecycle:
//! - Login with email/password, setting both session cookies
//! - Refresh, rotating the pair presented in the body or the `refreshToken` cookie
//! - Logout of one session or every session of the user
//! - Session check and the caller's device list
//!
//! Tokens are returned in the JSON body and as `HttpOnly` cookies, so browser
//! clients can ignore the body while API clients can ignore the cookies.
//!
//! # Examples
//!
//! Login:
//! ```bash
//! curl -i -X POST http://localhost:8080/auth/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "parent@example.com", "password": "Pass123!"}'
//! ```
//!
//! Refresh from the cookie jar:
//! ```bash
//! curl -i -X POST http://localhost:8080/auth/refresh -b cookies.txt -c cookies.txt
//! ```

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Response},
};
use kiz_session::auth::{
    AuthError, AuthUser as User, LoginRequest, LogoutRequest, RequestBody, SessionSummary,
    SessionTokens, TokenId,
    source::{LOGOUT_ACCESS_TOKEN_SOURCES, LOGOUT_REFRESH_TOKEN_SOURCES, REFRESH_TOKEN_SOURCES},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::{
    AppState,
    middleware::{ApiError, AuthUser, ClientDevice, MaybeAuthUser, presented_tokens},
};
use crate::{logging::log_security_event, metrics};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub email: Option<String>,
    pub password: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPayload {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutPayload {
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub logout_all: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub tokens: SessionTokens,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub tokens: SessionTokens,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub revoked: u64,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub user: Option<User>,
    pub authenticated: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

/// JSON body if it parses as `T`; empty or malformed bodies give `None`
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Option<T> {
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice(body).ok()
}

fn set_cookies([access, refresh]: [String; 2]) -> AppendHeaders<[(HeaderName, String); 2]> {
    AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)])
}

/// Authenticate with email and password and start a session.
///
/// # Request Body
///
/// ```json
/// {
///   "email": "parent@example.com",
///   "password": "SecurePass123!",
///   "deviceId": "phone-1"  // Optional
/// }
/// ```
///
/// # Response
///
/// `200 OK` with both session cookies set:
/// ```json
/// {
///   "user": { "id": "u1", "email": "parent@example.com", "nickname": "...", "avatar": null, "verified": true },
///   "tokens": { "accessToken": "eyJ...", "refreshToken": "eyJ...", "expiresIn": 900 }
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Email or password missing
/// - `401 Unauthorized`: Invalid credentials (never says which field was wrong)
pub async fn login(
    State(state): State<AppState>,
    ClientDevice(device): ClientDevice,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let payload: LoginPayload = parse_body(&body).unwrap_or_default();
    let ip_address = device.ip_address.clone();
    let request = LoginRequest {
        email: payload.email.unwrap_or_default(),
        password: payload.password.unwrap_or_default(),
        device_id: payload.device_id,
    };

    match state.sessions.login(request, device).await {
        Ok((user, tokens)) => {
            metrics::login_attempts_total(true);
            let cookies = set_cookies(state.cookies.session_cookies(&tokens));
            Ok((cookies, Json(LoginResponse { user, tokens })))
        }
        Err(e) => {
            metrics::login_attempts_total(false);
            if matches!(e, AuthError::InvalidCredentials) {
                log_security_event(
                    "failed_login",
                    None,
                    ip_address.as_deref(),
                    "Invalid credentials",
                );
            }
            Err(e.into())
        }
    }
}

/// Exchange a refresh token for a new pair.
///
/// The token is read from the JSON body `{"refreshToken": "..."}`. Only when the
/// body is empty or not JSON is the `refreshToken` cookie consulted; a JSON body
/// without the field counts as "no token".
///
/// # Errors
///
/// - `401 Unauthorized`: "Refresh token required", "Invalid refresh token" or
///   "Invalid or expired refresh token" (revoked, rotated away or blacklisted)
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let body = match parse_body::<RefreshPayload>(&body) {
        Some(payload) => RequestBody::Parsed(payload.refresh_token),
        None => RequestBody::Unreadable,
    };
    let token = presented_tokens(&headers, body).resolve(REFRESH_TOKEN_SOURCES);

    match state.sessions.refresh(token.as_deref()).await {
        Ok(tokens) => {
            metrics::refreshes_total(true);
            let cookies = set_cookies(state.cookies.session_cookies(&tokens));
            Ok((cookies, Json(RefreshResponse { tokens })))
        }
        Err(e) => {
            metrics::refreshes_total(false);
            if matches!(e, AuthError::RefreshTokenNotActive) {
                log_security_event(
                    "inactive_refresh_token",
                    None,
                    None,
                    "Refresh attempted with a revoked or rotated token",
                );
            }
            Err(e.into())
        }
    }
}

/// End the current session, or all of the user's sessions with `logoutAll`.
///
/// # Request Body (optional)
///
/// ```json
/// { "refreshToken": "eyJ...", "logoutAll": false }
/// ```
///
/// The refresh token falls back to the `refreshToken` cookie; the access token
/// is read from the `accessToken` cookie, then the `Authorization` header.
/// Both cookies are cleared on every outcome. Unknown or already revoked tokens
/// still succeed.
///
/// # Errors
///
/// - `400 Bad Request`: Neither an access nor a refresh token was presented
/// - `500 Internal Server Error`: Revocation could not be stored
pub async fn logout(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let payload = parse_body::<LogoutPayload>(&body);
    let logout_all = payload.as_ref().is_some_and(|p| p.logout_all);
    let body = match payload {
        Some(payload) => RequestBody::Parsed(payload.refresh_token),
        None => RequestBody::Unreadable,
    };

    let presented = presented_tokens(&headers, body);
    let request = LogoutRequest {
        refresh_token: presented.resolve(LOGOUT_REFRESH_TOKEN_SOURCES),
        access_token: presented.resolve(LOGOUT_ACCESS_TOKEN_SOURCES),
        logout_all,
    };

    let cleared = set_cookies(state.cookies.cleared_cookies());
    match state.sessions.logout(request).await {
        Ok(outcome) => {
            metrics::logouts_total(logout_all, outcome.revoked);
            (
                cleared,
                Json(LogoutResponse {
                    success: true,
                    revoked: outcome.revoked,
                }),
            )
                .into_response()
        }
        Err(e) => (cleared, ApiError::from(e)).into_response(),
    }
}

/// Current user, or `401 {"authenticated": false, "error": reason}`
pub async fn check(AuthUser(user): AuthUser) -> Json<CheckResponse> {
    Json(CheckResponse {
        user: Some(user),
        authenticated: true,
    })
}

/// Like [`check`] but always `200`, with `authenticated: false` for anonymous callers
pub async fn status(MaybeAuthUser(user): MaybeAuthUser) -> Json<CheckResponse> {
    Json(CheckResponse {
        authenticated: user.is_some(),
        user,
    })
}

/// The caller's sessions that can still be refreshed, newest first
pub async fn list_sessions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<SessionsResponse>, ApiError> {
    let sessions = state.sessions.list_sessions(&user.id).await?;
    Ok(Json(SessionsResponse { sessions }))
}

/// Revoke one of the caller's own sessions ("sign out that device")
///
/// # Errors
///
/// - `404 Not Found`: No such active session owned by the caller
pub async fn revoke_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(token_id): Path<TokenId>,
) -> Result<StatusCode, ApiError> {
    state.sessions.revoke_session(&user.id, token_id).await?;
    tracing::info!(user_id = %user.id, %token_id, "Session revoked by owner");
    Ok(StatusCode::NO_CONTENT)
}
