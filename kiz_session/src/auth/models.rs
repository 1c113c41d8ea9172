//! Session data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User ID type. Users are owned by the wider application.
pub type UserId = String;

/// Correlation id shared by the access and refresh token of one pair
pub type TokenId = Uuid;

/// The two credential kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Identity carried inside every signed token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub user_id: UserId,
    pub email: String,
    pub token_id: TokenId,
}

/// Descriptive request metadata captured at issuance.
///
/// Only ever used for auditing and the device list, never for authorization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Stored credential pair (`auth_tokens` row)
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TokenRecord {
    pub id: TokenId,
    pub user_id: UserId,
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub device_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub is_revoked: bool,
    pub is_blacklisted: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Build the row for a freshly minted pair
    pub fn new(pair: NewTokenRecord) -> Self {
        Self {
            id: pair.id,
            user_id: pair.user_id,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            access_token_expires_at: pair.access_token_expires_at,
            refresh_token_expires_at: pair.refresh_token_expires_at,
            device_id: pair.device.device_id,
            user_agent: pair.device.user_agent,
            ip_address: pair.device.ip_address,
            is_revoked: false,
            is_blacklisted: false,
            last_used_at: None,
            created_at: pair.created_at,
        }
    }

    /// Usable for a refresh exchange at `now`
    pub fn is_refreshable(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_blacklisted && self.refresh_token_expires_at > now
    }

    /// Usable to authenticate a request at `now`
    pub fn is_accessible(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_blacklisted && self.access_token_expires_at > now
    }

    /// Device metadata carried over on rotation
    pub fn device(&self) -> DeviceInfo {
        DeviceInfo {
            device_id: self.device_id.clone(),
            user_agent: self.user_agent.clone(),
            ip_address: self.ip_address.clone(),
        }
    }
}

/// Input for persisting a new credential pair
#[derive(Debug, Clone)]
pub struct NewTokenRecord {
    pub id: TokenId,
    pub user_id: UserId,
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub device: DeviceInfo,
    pub created_at: DateTime<Utc>,
}

/// Which records a revocation applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeCriteria {
    /// One pair by id
    TokenId(TokenId),
    /// The pair holding this literal refresh token
    RefreshToken(String),
    /// The pair holding this literal access token
    AccessToken(String),
    /// Every non-revoked pair of a user ("logout everywhere")
    AllForUser(UserId),
}

/// Token pair handed to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
}

/// Minimal user projection returned to handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub nickname: String,
    pub avatar: Option<String>,
    pub verified: bool,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_id: Option<String>,
}

/// Logout request, after token sources have been resolved
#[derive(Debug, Clone, Default)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub logout_all: bool,
}

/// What a logout actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutOutcome {
    pub revoked: u64,
}

/// Why a request could not be authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    NoToken,
    InvalidToken,
    /// Revoked, blacklisted, and expired all look the same from outside
    NotFoundOrExpired,
}

impl AuthFailure {
    pub fn reason(self) -> &'static str {
        match self {
            AuthFailure::NoToken => "No token provided",
            AuthFailure::InvalidToken => "Invalid token",
            AuthFailure::NotFoundOrExpired => "Token not found or expired",
        }
    }
}

/// Result of resolving a request to a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    Authenticated(AuthUser),
    Unauthenticated(AuthFailure),
}

impl Authentication {
    pub fn user(self) -> Option<AuthUser> {
        match self {
            Authentication::Authenticated(user) => Some(user),
            Authentication::Unauthenticated(_) => None,
        }
    }
}

/// One entry of a user's device list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub token_id: TokenId,
    pub device_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl From<&TokenRecord> for SessionSummary {
    fn from(record: &TokenRecord) -> Self {
        Self {
            token_id: record.id,
            device_id: record.device_id.clone(),
            user_agent: record.user_agent.clone(),
            ip_address: record.ip_address.clone(),
            created_at: record.created_at,
            last_used_at: record.last_used_at,
            expires_at: record.refresh_token_expires_at,
        }
    }
}
