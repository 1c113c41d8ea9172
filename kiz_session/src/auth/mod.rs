//! Session module: token pairs, rotation, revocation and request authentication.
//!
//! This module implements stateful JWT sessions with:
//! - Short-lived access tokens (15-minute default expiry)
//! - Rotating refresh tokens (7-day default expiry), single use
//! - Server-side bookkeeping so any pair can be revoked or blacklisted
//! - Device metadata for a per-user session list
//!
//! ## Example
//!
//! ```no_run
//! use kiz_session::auth::{CodecConfig, DeviceInfo, LoginRequest, SessionManager, TokenCodec};
//! use kiz_session::db::{Database, DatabaseConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&DatabaseConfig::from_env()).await?;
//!     let codec = TokenCodec::new(CodecConfig::new(
//!         "access-secret-at-least-32-characters!!",
//!         "refresh-secret-at-least-32-characters!",
//!     ));
//!     let sessions = SessionManager::new(
//!         codec,
//!         Arc::new(db.token_store()),
//!         Arc::new(db.user_directory("pepper".to_string())),
//!     );
//!
//!     let request = LoginRequest {
//!         email: "parent@example.com".to_string(),
//!         password: "SecurePass123".to_string(),
//!         device_id: None,
//!     };
//!
//!     let (user, tokens) = sessions.login(request, DeviceInfo::default()).await?;
//!     println!("{} logged in, access expires in {}s", user.nickname, tokens.expires_in);
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod codec;
pub mod cookie;
pub mod duration;
pub mod errors;
pub mod manager;
pub mod models;
pub mod password;
pub mod source;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{CodecConfig, InvalidToken, SignedPair, TokenCodec};
pub use cookie::{ACCESS_COOKIE_NAME, CookiePolicy, REFRESH_COOKIE_NAME, SameSite, get_cookie};
pub use duration::{DurationParseError, TokenDuration};
pub use errors::{AuthError, AuthResult};
pub use manager::SessionManager;
pub use models::{
    AuthFailure, AuthUser, Authentication, DeviceInfo, LoginRequest, LogoutOutcome,
    LogoutRequest, NewTokenRecord, RevokeCriteria, SessionSummary, SessionTokens, TokenId,
    TokenKind, TokenPayload, TokenRecord, UserId,
};
pub use source::{PresentedTokens, RequestBody, TokenSource};
