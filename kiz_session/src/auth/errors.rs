//! Session error types.

use thiserror::Error;

/// Session management errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Token signing failed
    #[error("Token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// A required login field was empty
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Email/password did not match. Never says which one.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No refresh token in the body or the cookie
    #[error("Refresh token required")]
    RefreshTokenRequired,

    /// Refresh token failed signature or expiry checks
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// Refresh token verified but the store no longer considers it active
    #[error("Invalid or expired refresh token")]
    RefreshTokenNotActive,

    /// Logout called without an access or a refresh token
    #[error("No token provided")]
    NoTokenProvided,

    /// Session does not exist or does not belong to the caller
    #[error("Session not found")]
    SessionNotFound,
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Database(_) | AuthError::HashingFailed => {
                "Internal server error".to_string()
            }
            AuthError::Signing(_) => "Authentication failed".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether the error comes from infrastructure rather than the caller's input
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AuthError::Database(_) | AuthError::Signing(_) | AuthError::HashingFailed
        )
    }
}

/// Result type for session operations
pub type AuthResult<T> = Result<T, AuthError>;
