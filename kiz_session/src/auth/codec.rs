//! Signing and verification of access and refresh tokens.
//!
//! Tokens are HS256 JWTs. Access and refresh tokens are signed with separate
//! secrets and carry a `typ` claim, so neither kind can stand in for the other.
//! Expiry is checked against the caller's clock rather than the OS clock.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::{
    duration::TokenDuration,
    errors::AuthResult,
    models::{TokenId, TokenKind, TokenPayload},
};

/// Default issuer tag
pub const DEFAULT_ISSUER: &str = "kiz-space";

/// Default audience tag
pub const DEFAULT_AUDIENCE: &str = "kiz-space-users";

/// JWT claims for both token kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    tid: TokenId,
    typ: TokenKind,
    iat: i64,
    exp: i64,
    iss: String,
    aud: String,
}

/// Why a token was refused. A value, not an error path: bad tokens are expected input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidToken {
    /// Bad signature, wrong kind, wrong issuer/audience, or garbage
    #[error("Token is malformed or has an invalid signature")]
    Malformed,

    /// Well-formed and correctly signed but past its `exp`
    #[error("Token has expired")]
    Expired,
}

/// Codec settings
#[derive(Clone)]
pub struct CodecConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: TokenDuration,
    pub refresh_ttl: TokenDuration,
}

impl CodecConfig {
    /// Config with the default issuer, audience and 15m/7d lifetimes
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            access_ttl: TokenDuration::minutes(15),
            refresh_ttl: TokenDuration::days(7),
        }
    }
}

impl fmt::Debug for CodecConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Both tokens of a freshly signed pair with their absolute expiries
#[derive(Debug, Clone)]
pub struct SignedPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Stateless token signer/verifier
#[derive(Clone)]
pub struct TokenCodec {
    access: Keys,
    refresh: Keys,
    issuer: String,
    audience: String,
    access_ttl: TokenDuration,
    refresh_ttl: TokenDuration,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(config: CodecConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is compared against the injected clock in `verify`.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);

        Self {
            access: Keys::from_secret(&config.access_secret),
            refresh: Keys::from_secret(&config.refresh_secret),
            issuer: config.issuer,
            audience: config.audience,
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
            validation,
        }
    }

    fn keys(&self, kind: TokenKind) -> &Keys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Lifetime of a token kind
    pub fn ttl(&self, kind: TokenKind) -> TokenDuration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Sign a token of `kind` for `payload`, valid from `now`
    pub fn issue(
        &self,
        kind: TokenKind,
        payload: &TokenPayload,
        now: DateTime<Utc>,
    ) -> AuthResult<String> {
        self.sign(kind, payload, now, self.ttl(kind).expires_at(now))
    }

    fn sign(
        &self,
        kind: TokenKind,
        payload: &TokenPayload,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<String> {
        let claims = Claims {
            sub: payload.user_id.clone(),
            email: payload.email.clone(),
            tid: payload.token_id,
            typ: kind,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.keys(kind).encoding,
        )?;
        Ok(token)
    }

    /// Sign an access/refresh pair sharing `payload.token_id`.
    ///
    /// The returned expiries are the same instants embedded in the tokens.
    pub fn issue_pair(&self, payload: &TokenPayload, now: DateTime<Utc>) -> AuthResult<SignedPair> {
        let access_expires_at = self.access_ttl.expires_at(now);
        let refresh_expires_at = self.refresh_ttl.expires_at(now);

        Ok(SignedPair {
            access_token: self.sign(TokenKind::Access, payload, now, access_expires_at)?,
            refresh_token: self.sign(TokenKind::Refresh, payload, now, refresh_expires_at)?,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Check signature, kind, issuer, audience and expiry of `token`
    pub fn verify(
        &self,
        kind: TokenKind,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPayload, InvalidToken> {
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &self.validation)
            .map_err(|_| InvalidToken::Malformed)?;
        let claims = data.claims;

        if claims.typ != kind {
            return Err(InvalidToken::Malformed);
        }

        if now.timestamp() >= claims.exp {
            return Err(InvalidToken::Expired);
        }

        Ok(TokenPayload {
            user_id: claims.sub,
            email: claims.email,
            token_id: claims.tid,
        })
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}
