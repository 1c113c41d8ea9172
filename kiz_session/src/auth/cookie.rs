//! Session cookie contract.
//!
//! Both tokens travel as `HttpOnly` cookies on `/` whose `Max-Age` equals the
//! token lifetime, so the browser drops a cookie when the server would reject it.

use std::fmt;
use std::str::FromStr;

use super::{duration::TokenDuration, models::SessionTokens};

/// Cookie holding the access token
pub const ACCESS_COOKIE_NAME: &str = "accessToken";

/// Cookie holding the refresh token
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// `SameSite` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Lax => f.write_str("Lax"),
            SameSite::Strict => f.write_str("Strict"),
        }
    }
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lax" => Ok(SameSite::Lax),
            "strict" => Ok(SameSite::Strict),
            other => Err(format!("unsupported SameSite policy '{other}'")),
        }
    }
}

/// Attributes shared by both session cookies
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    /// `Secure` flag, on in production
    pub secure: bool,
    pub same_site: SameSite,
    pub access_ttl: TokenDuration,
    pub refresh_ttl: TokenDuration,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            secure: false,
            same_site: SameSite::Lax,
            access_ttl: TokenDuration::minutes(15),
            refresh_ttl: TokenDuration::days(7),
        }
    }
}

impl CookiePolicy {
    fn build(&self, name: &str, value: &str, max_age: i64) -> String {
        let mut cookie =
            format!("{name}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite={}", self.same_site);
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` values carrying a freshly issued pair
    pub fn session_cookies(&self, tokens: &SessionTokens) -> [String; 2] {
        [
            self.build(
                ACCESS_COOKIE_NAME,
                &tokens.access_token,
                self.access_ttl.as_secs(),
            ),
            self.build(
                REFRESH_COOKIE_NAME,
                &tokens.refresh_token,
                self.refresh_ttl.as_secs(),
            ),
        ]
    }

    /// `Set-Cookie` values that delete both session cookies
    pub fn cleared_cookies(&self) -> [String; 2] {
        [
            self.build(ACCESS_COOKIE_NAME, "", 0),
            self.build(REFRESH_COOKIE_NAME, "", 0),
        ]
    }
}

/// Find cookie `name` in a `Cookie` request header value
pub fn get_cookie(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}
