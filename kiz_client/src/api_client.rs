//! HTTP API client for the session service.
//!
//! Tokens are sent as `Authorization: Bearer` and in JSON bodies; cookies are
//! left to browsers. Every response updates the [`SessionCache`].

use anyhow::{Context, Result, bail};
use kiz_session::auth::{AuthUser, LogoutOutcome, SessionSummary, SessionTokens, TokenId};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::session_cache::{SessionCache, SessionEvent};

/// API client for communicating with the session server
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    cache: SessionCache,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
    device_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest<'a> {
    refresh_token: &'a str,
    logout_all: bool,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user: AuthUser,
    tokens: SessionTokens,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    tokens: SessionTokens,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    user: Option<AuthUser>,
}

#[derive(Debug, Deserialize)]
struct SessionsResponse {
    sessions: Vec<SessionSummary>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Server-provided error text, or the status line if the body has none
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    }
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            cache: SessionCache::new(),
        }
    }

    /// Resume a saved pair. The user stays unknown until [`ApiClient::check`].
    pub fn with_tokens(mut self, tokens: SessionTokens) -> Self {
        self.cache.apply(SessionEvent::Refreshed(tokens));
        self
    }

    pub fn session(&self) -> &SessionCache {
        &self.cache
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/auth{}", self.base_url, path)
    }

    /// Login with email and password
    pub async fn login(
        &mut self,
        email: &str,
        password: &str,
        device_id: Option<&str>,
    ) -> Result<AuthUser> {
        let request = LoginRequest {
            email,
            password,
            device_id,
        };

        let response = self
            .client
            .post(self.url("/login"))
            .json(&request)
            .send()
            .await
            .context("Failed to send login request")?;

        if !response.status().is_success() {
            bail!("Login failed: {}", error_message(response).await);
        }

        let body: LoginResponse = response
            .json()
            .await
            .context("Failed to parse login response")?;

        self.cache.apply(SessionEvent::LoggedIn {
            user: body.user.clone(),
            tokens: body.tokens,
        });

        Ok(body.user)
    }

    /// Rotate the held refresh token. A rejected token ends the local session.
    pub async fn refresh(&mut self) -> Result<()> {
        let refresh_token = self
            .cache
            .refresh_token()
            .context("Not logged in")?
            .to_string();

        let response = self
            .client
            .post(self.url("/refresh"))
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await
            .context("Failed to send refresh request")?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let reason = error_message(response).await;
            self.cache.apply(SessionEvent::LoggedOut);
            bail!("Refresh failed: {reason}");
        }
        if !response.status().is_success() {
            bail!("Refresh failed: {}", error_message(response).await);
        }

        let body: RefreshResponse = response
            .json()
            .await
            .context("Failed to parse refresh response")?;
        self.cache.apply(SessionEvent::Refreshed(body.tokens));

        Ok(())
    }

    /// Ask the server who we are.
    ///
    /// A rejected access token gets one refresh attempt before the client
    /// settles on anonymous.
    pub async fn check(&mut self) -> Result<Option<AuthUser>> {
        if let Some(user) = self.fetch_check().await? {
            return Ok(Some(user));
        }

        if self.cache.refresh_token().is_some() {
            match self.refresh().await {
                Ok(()) => {
                    if let Some(user) = self.fetch_check().await? {
                        return Ok(Some(user));
                    }
                }
                Err(e) => log::debug!("Refresh during check failed: {e:#}"),
            }
        }

        self.cache.apply(SessionEvent::Checked(None));
        Ok(None)
    }

    async fn fetch_check(&mut self) -> Result<Option<AuthUser>> {
        let mut request = self.client.get(self.url("/check"));
        if let Some(token) = self.cache.access_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("Failed to send check request")?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                self.cache.apply(SessionEvent::Unauthorized);
                Ok(None)
            }
            status if status.is_success() => {
                let body: CheckResponse = response
                    .json()
                    .await
                    .context("Failed to parse check response")?;
                self.cache.apply(SessionEvent::Checked(body.user.clone()));
                Ok(body.user)
            }
            _ => bail!("Session check failed: {}", error_message(response).await),
        }
    }

    /// Active sessions of the current user
    pub async fn sessions(&mut self) -> Result<Vec<SessionSummary>> {
        let response = self.send_authorized(Method::GET, "/sessions").await?;
        let body: SessionsResponse = response
            .json()
            .await
            .context("Failed to parse session list")?;
        Ok(body.sessions)
    }

    /// Sign out one of the current user's devices
    pub async fn revoke_session(&mut self, token_id: TokenId) -> Result<()> {
        self.send_authorized(Method::DELETE, &format!("/sessions/{token_id}"))
            .await?;
        Ok(())
    }

    /// End the session locally, then tell the server.
    ///
    /// Returns the number of sessions the server revoked, or `None` when there
    /// was nothing to revoke or the server could not be reached. Server-side
    /// failures are logged and otherwise ignored.
    pub async fn logout(&mut self, logout_all: bool) -> Option<u64> {
        let tokens = self.cache.tokens().cloned();
        self.cache.apply(SessionEvent::LoggedOut);
        let tokens = tokens?;

        let result = self
            .client
            .post(self.url("/logout"))
            .bearer_auth(&tokens.access_token)
            .json(&LogoutRequest {
                refresh_token: &tokens.refresh_token,
                logout_all,
            })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<LogoutOutcome>().await {
                    Ok(outcome) => Some(outcome.revoked),
                    Err(e) => {
                        log::warn!("Unreadable logout response: {e}");
                        None
                    }
                }
            }
            Ok(response) => {
                log::warn!("Server-side logout failed: {}", error_message(response).await);
                None
            }
            Err(e) => {
                log::warn!("Server-side logout failed: {e}");
                None
            }
        }
    }

    async fn send_authorized(&mut self, method: Method, path: &str) -> Result<reqwest::Response> {
        let token = self
            .cache
            .access_token()
            .context("Not logged in")?
            .to_string();

        let response = self
            .client
            .request(method, self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {path}"))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let reason = error_message(response).await;
            self.cache.apply(SessionEvent::Unauthorized);
            bail!("Not authenticated: {reason}");
        }
        if !response.status().is_success() {
            bail!("Request to {path} failed: {}", error_message(response).await);
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_api_prefix() {
        let client = ApiClient::new("http://localhost:8080/".to_string());
        assert_eq!(client.url("/login"), "http://localhost:8080/api/auth/login");
    }

    #[test]
    fn test_request_bodies_are_camel_case() {
        let body = serde_json::to_value(LogoutRequest {
            refresh_token: "r",
            logout_all: true,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"refreshToken": "r", "logoutAll": true}));
    }

    #[tokio::test]
    async fn test_logout_without_session_skips_network() {
        let mut client = ApiClient::new("http://localhost:1".to_string());
        assert_eq!(client.logout(false).await, None);
    }
}
