//! Request authentication for protected endpoints.
//!
//! Two extractors resolve the caller from the access token, looked up in
//! `Authorization: Bearer` first and the `accessToken` cookie second:
//!
//! - [`AuthUser`] rejects the request with `401` when authentication fails.
//! - [`MaybeAuthUser`] never rejects; it yields `None` for anonymous callers.
//!
//! # Usage
//!
//! ```rust,no_run
//! use kiz_server::api::middleware::{AuthUser, MaybeAuthUser};
//!
//! async fn profile(AuthUser(user): AuthUser) -> String {
//!     format!("Authenticated as {}", user.nickname)
//! }
//!
//! async fn feed(MaybeAuthUser(user): MaybeAuthUser) -> String {
//!     match user {
//!         Some(user) => format!("Feed for {}", user.nickname),
//!         None => "Public feed".to_string(),
//!     }
//! }
//! # let _ = (profile, feed);
//! ```

use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts},
    http::{
        HeaderMap, StatusCode,
        header::{AUTHORIZATION, COOKIE, USER_AGENT},
        request::Parts,
    },
    response::{IntoResponse, Response},
};
use kiz_session::auth::{
    self, AuthError, AuthFailure, Authentication, DeviceInfo, PresentedTokens, RequestBody,
    source::ACCESS_TOKEN_SOURCES,
};
use serde::Serialize;
use std::{borrow::Cow, convert::Infallible, net::SocketAddr};

use super::AppState;
use crate::metrics;

/// Collect the raw token carriers of a request
pub fn presented_tokens(headers: &HeaderMap, body: RequestBody) -> PresentedTokens<'_> {
    PresentedTokens {
        authorization: headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
        cookie_header: cookie_header(headers),
        body,
    }
}

/// All `Cookie` fields as one value; HTTP/2 clients may split cookies across several
fn cookie_header(headers: &HeaderMap) -> Option<Cow<'_, str>> {
    let fields: Vec<&str> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    match fields.as_slice() {
        [] => None,
        [single] => Some(Cow::Borrowed(*single)),
        _ => Some(Cow::Owned(fields.join("; "))),
    }
}

/// Authenticated caller; rejects with `401` otherwise
#[derive(Debug, Clone)]
pub struct AuthUser(pub auth::AuthUser);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = presented_tokens(&parts.headers, RequestBody::Unreadable)
            .resolve(ACCESS_TOKEN_SOURCES);

        match state.sessions.authenticate(token.as_deref()).await? {
            Authentication::Authenticated(user) => {
                metrics::authentications_total("authenticated");
                Ok(AuthUser(user))
            }
            Authentication::Unauthenticated(failure) => {
                metrics::authentications_total(failure_label(failure));
                Err(ApiError::Unauthenticated(failure))
            }
        }
    }
}

/// Caller if authenticated, `None` for anonymous or failed authentication
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<auth::AuthUser>);

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Infallible> {
        let token = presented_tokens(&parts.headers, RequestBody::Unreadable)
            .resolve(ACCESS_TOKEN_SOURCES);

        Ok(MaybeAuthUser(
            state.sessions.authenticate_optional(token.as_deref()).await,
        ))
    }
}

fn failure_label(failure: AuthFailure) -> &'static str {
    match failure {
        AuthFailure::NoToken => "no_token",
        AuthFailure::InvalidToken => "invalid_token",
        AuthFailure::NotFoundOrExpired => "not_found_or_expired",
    }
}

/// Descriptive device metadata of the inbound request. Missing parts stay `None`.
#[derive(Debug, Clone)]
pub struct ClientDevice(pub DeviceInfo);

impl<S> FromRequestParts<S> for ClientDevice
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Infallible> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let forwarded_for = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string);

        let ip_address = forwarded_for.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(ClientDevice(DeviceInfo {
            device_id: None,
            user_agent,
            ip_address,
        }))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<bool>,
}

/// Error returned by handlers and extractors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{}", .0.reason())]
    Unauthenticated(AuthFailure),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(err) => match err {
                AuthError::MissingField(_) | AuthError::NoTokenProvided => StatusCode::BAD_REQUEST,
                AuthError::InvalidCredentials
                | AuthError::RefreshTokenRequired
                | AuthError::InvalidRefreshToken
                | AuthError::RefreshTokenNotActive => StatusCode::UNAUTHORIZED,
                AuthError::SessionNotFound => StatusCode::NOT_FOUND,
                AuthError::Database(_) | AuthError::Signing(_) | AuthError::HashingFailed => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Unauthenticated(failure) => ErrorResponse {
                error: failure.reason().to_string(),
                authenticated: Some(false),
            },
            ApiError::Auth(err) => {
                if err.is_internal() {
                    tracing::error!(error = %err, "Session operation failed");
                }
                ErrorResponse {
                    error: err.client_message(),
                    authenticated: None,
                }
            }
        };

        (status, Json(body)).into_response()
    }
}
