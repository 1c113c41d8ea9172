//! # Kiz Session
//!
//! Stateful JWT session management: short-lived access tokens, single-use
//! rotating refresh tokens, and a server-side record of every issued pair so
//! sessions can be listed, revoked and blacklisted.
//!
//! ## Core Modules
//!
//! - [`auth`]: Token codec, session manager, cookie contract and token sources
//! - [`db`]: Token store and user directory, PostgreSQL and in-memory
//!
//! ## Example
//!
//! ```
//! use kiz_session::auth::{CodecConfig, TokenCodec, TokenKind, TokenPayload};
//! use chrono::Utc;
//!
//! let codec = TokenCodec::new(CodecConfig::new(
//!     "access-secret-at-least-32-characters!!",
//!     "refresh-secret-at-least-32-characters!",
//! ));
//! let payload = TokenPayload {
//!     user_id: "user-1".to_string(),
//!     email: "parent@example.com".to_string(),
//!     token_id: uuid::Uuid::new_v4(),
//! };
//! let now = Utc::now();
//! let token = codec.issue(TokenKind::Access, &payload, now).unwrap();
//! assert_eq!(codec.verify(TokenKind::Access, &token, now), Ok(payload));
//! ```

/// Session issuance, validation and revocation.
pub mod auth;

/// Storage for token records and user lookups.
pub mod db;

pub use auth::{AuthError, AuthResult, SessionManager};
