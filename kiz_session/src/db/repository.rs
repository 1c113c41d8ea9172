//! Repository traits for token bookkeeping and user lookups.
//!
//! [`TokenStore`] is the authority on whether a credential pair is still
//! usable. [`UserDirectory`] is the seam to the application's user table.
//! Both come with PostgreSQL implementations here and in-memory ones in
//! [`super::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};

use crate::auth::{
    AuthResult, AuthUser, NewTokenRecord, RevokeCriteria, TokenId, TokenRecord, password,
};

/// Trait for credential pair bookkeeping
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a newly issued pair
    async fn create(&self, record: NewTokenRecord) -> AuthResult<TokenRecord>;

    /// Revoke `predecessor` and persist `successor` as one atomic unit.
    ///
    /// The revoke only applies while the predecessor is still refreshable at
    /// `now`. Returns `None`, with nothing written, when it was not.
    async fn rotate(
        &self,
        predecessor: TokenId,
        successor: NewTokenRecord,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<TokenRecord>>;

    /// Pair holding this refresh token, if not revoked, blacklisted or refresh-expired
    async fn find_active_by_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<TokenRecord>>;

    /// Pair holding this access token, if not revoked, blacklisted or access-expired
    async fn find_active_by_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<TokenRecord>>;

    /// Mark every matching non-revoked pair revoked. Returns how many changed.
    async fn revoke(&self, criteria: &RevokeCriteria) -> AuthResult<u64>;

    /// Record use of a pair
    async fn touch(&self, id: TokenId, now: DateTime<Utc>) -> AuthResult<()>;

    /// Administrative invalidation. Returns `false` if the pair does not exist.
    async fn blacklist(&self, id: TokenId) -> AuthResult<bool>;

    /// Refreshable pairs of a user, newest first
    async fn list_active_for_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<TokenRecord>>;

    /// Delete pairs that can never authenticate again
    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64>;
}

/// Trait for the user lookups the session layer needs
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// User owning `email` if `password` matches, otherwise `None`
    async fn verify_credentials(&self, email: &str, password: &str)
    -> AuthResult<Option<AuthUser>>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<AuthUser>>;

    /// Update the user's "last seen" timestamp
    async fn mark_seen(&self, user_id: &str, now: DateTime<Utc>) -> AuthResult<()>;
}

/// Trim and lower-case an email for lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

const TOKEN_COLUMNS: &str = "id, user_id, access_token, refresh_token, \
                             access_token_expires_at, refresh_token_expires_at, \
                             device_id, user_agent, ip_address, is_revoked, \
                             is_blacklisted, last_used_at, created_at";

/// PostgreSQL implementation of [`TokenStore`] over the `auth_tokens` table
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert<'e, E>(executor: E, record: NewTokenRecord) -> AuthResult<TokenRecord>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO auth_tokens (id, user_id, access_token, refresh_token,
                                      access_token_expires_at, refresh_token_expires_at,
                                      device_id, user_agent, ip_address, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {TOKEN_COLUMNS}"
        );

        let row = sqlx::query_as::<_, TokenRecord>(&query)
            .bind(record.id)
            .bind(&record.user_id)
            .bind(&record.access_token)
            .bind(&record.refresh_token)
            .bind(record.access_token_expires_at)
            .bind(record.refresh_token_expires_at)
            .bind(&record.device.device_id)
            .bind(&record.device.user_agent)
            .bind(&record.device.ip_address)
            .bind(record.created_at)
            .fetch_one(executor)
            .await?;

        Ok(row)
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn create(&self, record: NewTokenRecord) -> AuthResult<TokenRecord> {
        Self::insert(&self.pool, record).await
    }

    async fn rotate(
        &self,
        predecessor: TokenId,
        successor: NewTokenRecord,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<TokenRecord>> {
        let mut tx = self.pool.begin().await?;

        // Conditional revoke: of two concurrent rotations only one sees a row change.
        let revoked = sqlx::query(
            "UPDATE auth_tokens SET is_revoked = true
             WHERE id = $1
               AND is_revoked = false
               AND is_blacklisted = false
               AND refresh_token_expires_at > $2",
        )
        .bind(predecessor)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        let record = Self::insert(&mut *tx, successor).await?;
        tx.commit().await?;

        Ok(Some(record))
    }

    async fn find_active_by_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<TokenRecord>> {
        let query = format!(
            "SELECT {TOKEN_COLUMNS} FROM auth_tokens
             WHERE refresh_token = $1
               AND is_revoked = false
               AND is_blacklisted = false
               AND refresh_token_expires_at > $2"
        );

        Ok(sqlx::query_as::<_, TokenRecord>(&query)
            .bind(token)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_active_by_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<TokenRecord>> {
        let query = format!(
            "SELECT {TOKEN_COLUMNS} FROM auth_tokens
             WHERE access_token = $1
               AND is_revoked = false
               AND is_blacklisted = false
               AND access_token_expires_at > $2"
        );

        Ok(sqlx::query_as::<_, TokenRecord>(&query)
            .bind(token)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn revoke(&self, criteria: &RevokeCriteria) -> AuthResult<u64> {
        let result = match criteria {
            RevokeCriteria::TokenId(id) => {
                sqlx::query(
                    "UPDATE auth_tokens SET is_revoked = true
                     WHERE id = $1 AND is_revoked = false",
                )
                .bind(id)
                .execute(&self.pool)
                .await?
            }
            RevokeCriteria::RefreshToken(token) => {
                sqlx::query(
                    "UPDATE auth_tokens SET is_revoked = true
                     WHERE refresh_token = $1 AND is_revoked = false",
                )
                .bind(token)
                .execute(&self.pool)
                .await?
            }
            RevokeCriteria::AccessToken(token) => {
                sqlx::query(
                    "UPDATE auth_tokens SET is_revoked = true
                     WHERE access_token = $1 AND is_revoked = false",
                )
                .bind(token)
                .execute(&self.pool)
                .await?
            }
            RevokeCriteria::AllForUser(user_id) => {
                sqlx::query(
                    "UPDATE auth_tokens SET is_revoked = true
                     WHERE user_id = $1 AND is_revoked = false",
                )
                .bind(user_id)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected())
    }

    async fn touch(&self, id: TokenId, now: DateTime<Utc>) -> AuthResult<()> {
        sqlx::query("UPDATE auth_tokens SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn blacklist(&self, id: TokenId) -> AuthResult<bool> {
        let result = sqlx::query("UPDATE auth_tokens SET is_blacklisted = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_active_for_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<TokenRecord>> {
        let query = format!(
            "SELECT {TOKEN_COLUMNS} FROM auth_tokens
             WHERE user_id = $1
               AND is_revoked = false
               AND is_blacklisted = false
               AND refresh_token_expires_at > $2
             ORDER BY created_at DESC"
        );

        Ok(sqlx::query_as::<_, TokenRecord>(&query)
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let result = sqlx::query(
            "DELETE FROM auth_tokens
             WHERE refresh_token_expires_at <= $1 OR is_revoked = true",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    #[sqlx(flatten)]
    user: AuthUser,
    password_hash: String,
}

/// PostgreSQL implementation of [`UserDirectory`] over the `users` table
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
    pepper: String,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool, pepper: String) -> Self {
        Self { pool, pepper }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<Option<AuthUser>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT id, email, nickname, avatar, verified, password_hash
             FROM users WHERE email = $1",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        let matched = password::verify_password_or_dummy(
            password,
            &self.pepper,
            row.as_ref().map(|row| row.password_hash.as_str()),
        );

        Ok(row.filter(|_| matched).map(|row| row.user))
    }

    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<AuthUser>> {
        Ok(sqlx::query_as::<_, AuthUser>(
            "SELECT id, email, nickname, avatar, verified FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn mark_seen(&self, user_id: &str, now: DateTime<Utc>) -> AuthResult<()> {
        sqlx::query("UPDATE users SET last_seen_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
