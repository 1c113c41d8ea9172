//! Where a request's tokens are looked up, in order.
//!
//! Each endpoint names one of the fixed source lists below instead of
//! re-implementing header/cookie/body precedence itself.

use std::borrow::Cow;

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, get_cookie};

/// A single place a token may be carried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// `Authorization: Bearer <token>`
    AuthorizationHeader,
    /// Named cookie
    Cookie(&'static str),
    /// Token field of the JSON request body. When `authoritative`, a body
    /// that parsed but lacks the field ends the lookup.
    Body { authoritative: bool },
}

/// Access token for authenticated requests: header first, then cookie
pub const ACCESS_TOKEN_SOURCES: &[TokenSource] = &[
    TokenSource::AuthorizationHeader,
    TokenSource::Cookie(ACCESS_COOKIE_NAME),
];

/// Refresh token for the refresh exchange: body first, cookie only if the body is unreadable
pub const REFRESH_TOKEN_SOURCES: &[TokenSource] = &[
    TokenSource::Body {
        authoritative: true,
    },
    TokenSource::Cookie(REFRESH_COOKIE_NAME),
];

/// Refresh token presented at logout: body first, then cookie
pub const LOGOUT_REFRESH_TOKEN_SOURCES: &[TokenSource] = &[
    TokenSource::Body {
        authoritative: false,
    },
    TokenSource::Cookie(REFRESH_COOKIE_NAME),
];

/// Access token presented at logout: cookie first, header as fallback
pub const LOGOUT_ACCESS_TOKEN_SOURCES: &[TokenSource] = &[
    TokenSource::Cookie(ACCESS_COOKIE_NAME),
    TokenSource::AuthorizationHeader,
];

/// State of the request body with respect to a token field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestBody {
    /// Empty or not JSON; later sources are consulted
    #[default]
    Unreadable,
    /// Parsed JSON with the token field, if it was present
    Parsed(Option<String>),
}

/// Raw token carriers of one request
#[derive(Debug, Clone, Default)]
pub struct PresentedTokens<'a> {
    pub authorization: Option<&'a str>,
    /// Every `Cookie` field of the request, joined with `; `
    pub cookie_header: Option<Cow<'a, str>>,
    pub body: RequestBody,
}

enum Lookup {
    Found(String),
    Next,
    Stop,
}

impl PresentedTokens<'_> {
    fn lookup(&self, source: TokenSource) -> Lookup {
        let found = match source {
            TokenSource::AuthorizationHeader => self
                .authorization
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
            TokenSource::Cookie(name) => self
                .cookie_header
                .as_deref()
                .and_then(|header| get_cookie(header, name)),
            TokenSource::Body { authoritative } => match &self.body {
                RequestBody::Unreadable => None,
                RequestBody::Parsed(Some(token)) if !token.is_empty() => Some(token.clone()),
                RequestBody::Parsed(_) if authoritative => return Lookup::Stop,
                RequestBody::Parsed(_) => None,
            },
        };

        match found {
            Some(token) => Lookup::Found(token),
            None => Lookup::Next,
        }
    }

    /// First token found walking `sources` in order
    pub fn resolve(&self, sources: &[TokenSource]) -> Option<String> {
        for source in sources {
            match self.lookup(*source) {
                Lookup::Found(token) => return Some(token),
                Lookup::Stop => return None,
                Lookup::Next => {}
            }
        }
        None
    }
}
