//! Session manager: issuance, rotation, authentication and revocation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    clock::{Clock, SystemClock},
    codec::{InvalidToken, TokenCodec},
    errors::{AuthError, AuthResult},
    models::{
        AuthFailure, AuthUser, Authentication, DeviceInfo, LoginRequest, LogoutOutcome,
        LogoutRequest, NewTokenRecord, RevokeCriteria, SessionSummary, SessionTokens, TokenId,
        TokenKind, TokenPayload, UserId,
    },
};
use crate::db::{TokenStore, UserDirectory};

/// Session manager
#[derive(Clone)]
pub struct SessionManager {
    codec: TokenCodec,
    store: Arc<dyn TokenStore>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    /// Create a new session manager on the wall clock
    ///
    /// # Arguments
    ///
    /// * `codec` - Token signer/verifier
    /// * `store` - Credential pair bookkeeping
    /// * `users` - Credential verification and user lookups
    pub fn new(codec: TokenCodec, store: Arc<dyn TokenStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            codec,
            store,
            users,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seconds an access token stays valid
    pub fn expires_in(&self) -> i64 {
        self.codec.ttl(TokenKind::Access).as_secs()
    }

    /// Login a user with email and password
    ///
    /// # Arguments
    ///
    /// * `request` - Email, password and optional device id
    /// * `device` - Metadata pulled from the inbound request
    ///
    /// # Errors
    ///
    /// * `AuthError::MissingField` - Email or password empty; nothing is written
    /// * `AuthError::InvalidCredentials` - No such user or wrong password; nothing is written
    pub async fn login(
        &self,
        request: LoginRequest,
        mut device: DeviceInfo,
    ) -> AuthResult<(AuthUser, SessionTokens)> {
        if request.email.trim().is_empty() {
            return Err(AuthError::MissingField("email"));
        }
        if request.password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }

        let user = match self
            .users
            .verify_credentials(&request.email, &request.password)
            .await?
        {
            Some(user) => user,
            None => {
                log::warn!(
                    "Failed login attempt from {}",
                    device.ip_address.as_deref().unwrap_or("unknown address")
                );
                return Err(AuthError::InvalidCredentials);
            }
        };

        if request.device_id.is_some() {
            device.device_id = request.device_id;
        }

        let tokens = self.issue(&user.id, &user.email, device).await?;
        Ok((user, tokens))
    }

    /// Mint and persist a new credential pair for an already verified user
    pub async fn issue(
        &self,
        user_id: &str,
        email: &str,
        device: DeviceInfo,
    ) -> AuthResult<SessionTokens> {
        let now = self.clock.now();
        let (record, tokens) = self.mint(user_id, email, device, now)?;
        let token_id = record.id;

        self.store.create(record).await?;
        log::info!("Issued session {token_id} for user {user_id}");

        Ok(tokens)
    }

    fn mint(
        &self,
        user_id: &str,
        email: &str,
        device: DeviceInfo,
        now: DateTime<Utc>,
    ) -> AuthResult<(NewTokenRecord, SessionTokens)> {
        let payload = TokenPayload {
            user_id: user_id.to_string(),
            email: email.to_string(),
            token_id: Uuid::new_v4(),
        };
        let signed = self.codec.issue_pair(&payload, now)?;

        let tokens = SessionTokens {
            access_token: signed.access_token.clone(),
            refresh_token: signed.refresh_token.clone(),
            expires_in: self.expires_in(),
        };
        let record = NewTokenRecord {
            id: payload.token_id,
            user_id: payload.user_id,
            access_token: signed.access_token,
            refresh_token: signed.refresh_token,
            access_token_expires_at: signed.access_expires_at,
            refresh_token_expires_at: signed.refresh_expires_at,
            device,
            created_at: now,
        };

        Ok((record, tokens))
    }

    /// Exchange a refresh token for a new pair, revoking the old one
    ///
    /// # Errors
    ///
    /// * `AuthError::RefreshTokenRequired` - No token given
    /// * `AuthError::InvalidRefreshToken` - Signature, kind or embedded expiry check failed
    /// * `AuthError::RefreshTokenNotActive` - Revoked, blacklisted, store-expired,
    ///   or lost a race against a concurrent refresh of the same token
    pub async fn refresh(&self, refresh_token: Option<&str>) -> AuthResult<SessionTokens> {
        let token = refresh_token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::RefreshTokenRequired)?;
        let now = self.clock.now();

        let payload = self
            .codec
            .verify(TokenKind::Refresh, token, now)
            .map_err(|_| AuthError::InvalidRefreshToken)?;

        let current = self
            .store
            .find_active_by_refresh_token(token, now)
            .await?
            .filter(|record| record.id == payload.token_id && record.user_id == payload.user_id);

        let Some(current) = current else {
            // Signed and unexpired but no longer active: reuse of a rotated token.
            log::warn!(
                "Refresh attempted with inactive session {} of user {}",
                payload.token_id,
                payload.user_id
            );
            return Err(AuthError::RefreshTokenNotActive);
        };

        let (successor, tokens) =
            self.mint(&current.user_id, &payload.email, current.device(), now)?;
        let successor_id = successor.id;

        match self.store.rotate(current.id, successor, now).await? {
            Some(_) => {
                log::info!(
                    "Rotated session {} to {successor_id} for user {}",
                    current.id,
                    current.user_id
                );
                Ok(tokens)
            }
            None => {
                log::warn!("Concurrent refresh lost the race for session {}", current.id);
                Err(AuthError::RefreshTokenNotActive)
            }
        }
    }

    /// Resolve an access token to the acting user
    ///
    /// Expected failures come back as `Authentication::Unauthenticated`; only
    /// storage errors are returned as `Err`.
    pub async fn authenticate(&self, access_token: Option<&str>) -> AuthResult<Authentication> {
        let Some(token) = access_token.filter(|token| !token.is_empty()) else {
            return Ok(Authentication::Unauthenticated(AuthFailure::NoToken));
        };
        let now = self.clock.now();

        let payload = match self.codec.verify(TokenKind::Access, token, now) {
            Ok(payload) => payload,
            Err(InvalidToken::Expired) => {
                return Ok(Authentication::Unauthenticated(
                    AuthFailure::NotFoundOrExpired,
                ));
            }
            Err(InvalidToken::Malformed) => {
                return Ok(Authentication::Unauthenticated(AuthFailure::InvalidToken));
            }
        };

        let record = self
            .store
            .find_active_by_access_token(token, now)
            .await?
            .filter(|record| record.id == payload.token_id);
        let Some(record) = record else {
            return Ok(Authentication::Unauthenticated(
                AuthFailure::NotFoundOrExpired,
            ));
        };

        let Some(user) = self.users.find_by_id(&record.user_id).await? else {
            return Ok(Authentication::Unauthenticated(
                AuthFailure::NotFoundOrExpired,
            ));
        };

        self.store.touch(record.id, now).await?;
        self.users.mark_seen(&user.id, now).await?;

        Ok(Authentication::Authenticated(user))
    }

    /// Like [`Self::authenticate`] but never fails: any problem means "anonymous"
    pub async fn authenticate_optional(&self, access_token: Option<&str>) -> Option<AuthUser> {
        match self.authenticate(access_token).await {
            Ok(authentication) => authentication.user(),
            Err(e) => {
                log::error!("Optional authentication failed: {e}");
                None
            }
        }
    }

    /// Revoke the presented pair, or every pair of its user with `logout_all`.
    ///
    /// Unknown, expired or already revoked tokens are not an error.
    ///
    /// # Errors
    ///
    /// * `AuthError::NoTokenProvided` - Neither an access nor a refresh token was given
    pub async fn logout(&self, request: LogoutRequest) -> AuthResult<LogoutOutcome> {
        let refresh = request.refresh_token.filter(|token| !token.is_empty());
        let access = request.access_token.filter(|token| !token.is_empty());
        if refresh.is_none() && access.is_none() {
            return Err(AuthError::NoTokenProvided);
        }

        if request.logout_all {
            let now = self.clock.now();
            let Some(user_id) = self.resolve_user(refresh.as_deref(), access.as_deref(), now)
            else {
                return Ok(LogoutOutcome { revoked: 0 });
            };

            let revoked = self
                .store
                .revoke(&RevokeCriteria::AllForUser(user_id.clone()))
                .await?;
            log::info!("Revoked {revoked} session(s) of user {user_id}");
            return Ok(LogoutOutcome { revoked });
        }

        let mut revoked = 0;
        if let Some(token) = refresh {
            revoked += self.store.revoke(&RevokeCriteria::RefreshToken(token)).await?;
        }
        if let Some(token) = access {
            revoked += self.store.revoke(&RevokeCriteria::AccessToken(token)).await?;
        }

        Ok(LogoutOutcome { revoked })
    }

    fn resolve_user(
        &self,
        refresh: Option<&str>,
        access: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<UserId> {
        refresh
            .and_then(|token| self.codec.verify(TokenKind::Refresh, token, now).ok())
            .or_else(|| access.and_then(|token| self.codec.verify(TokenKind::Access, token, now).ok()))
            .map(|payload| payload.user_id)
    }

    /// Device list: the user's sessions that can still be refreshed
    pub async fn list_sessions(&self, user_id: &str) -> AuthResult<Vec<SessionSummary>> {
        let records = self
            .store
            .list_active_for_user(user_id, self.clock.now())
            .await?;
        Ok(records.iter().map(SessionSummary::from).collect())
    }

    /// Revoke one of the user's own sessions
    ///
    /// # Errors
    ///
    /// * `AuthError::SessionNotFound` - Not active, or owned by someone else
    pub async fn revoke_session(&self, user_id: &str, token_id: TokenId) -> AuthResult<()> {
        let owned = self
            .store
            .list_active_for_user(user_id, self.clock.now())
            .await?
            .iter()
            .any(|record| record.id == token_id);
        if !owned {
            return Err(AuthError::SessionNotFound);
        }

        self.store.revoke(&RevokeCriteria::TokenId(token_id)).await?;
        Ok(())
    }

    /// Administrative invalidation, independent of logout and rotation
    pub async fn blacklist(&self, token_id: TokenId) -> AuthResult<bool> {
        let found = self.store.blacklist(token_id).await?;
        if found {
            log::warn!("Session {token_id} blacklisted");
        }
        Ok(found)
    }

    /// Drop records that can never authenticate again
    pub async fn purge_expired(&self) -> AuthResult<u64> {
        self.store.purge_expired(self.clock.now()).await
    }
}
