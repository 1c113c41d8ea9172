//! In-memory [`TokenStore`] and [`UserDirectory`].
//!
//! Same contracts as the PostgreSQL implementations, with every operation
//! serialized behind one lock. Used by tests and by ephemeral server runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::repository::{TokenStore, UserDirectory, normalize_email};
use crate::auth::{
    AuthError, AuthResult, AuthUser, NewTokenRecord, RevokeCriteria, TokenId, TokenRecord,
    UserId, password,
};

fn unavailable() -> AuthError {
    AuthError::Database(sqlx::Error::PoolTimedOut)
}

/// Token store held in process memory
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    records: Mutex<HashMap<TokenId, TokenRecord>>,
    offline: AtomicBool,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following operation fail like an unreachable database
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> AuthResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    /// Copy of every stored record, including revoked ones
    pub async fn snapshot(&self) -> Vec<TokenRecord> {
        self.records.lock().await.values().cloned().collect()
    }

    pub async fn get(&self, id: TokenId) -> Option<TokenRecord> {
        self.records.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn create(&self, record: NewTokenRecord) -> AuthResult<TokenRecord> {
        self.check_online()?;
        let record = TokenRecord::new(record);
        self.records.lock().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn rotate(
        &self,
        predecessor: TokenId,
        successor: NewTokenRecord,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<TokenRecord>> {
        self.check_online()?;
        let mut records = self.records.lock().await;

        match records.get_mut(&predecessor) {
            Some(old) if old.is_refreshable(now) => old.is_revoked = true,
            _ => return Ok(None),
        }

        let record = TokenRecord::new(successor);
        records.insert(record.id, record.clone());
        Ok(Some(record))
    }

    async fn find_active_by_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<TokenRecord>> {
        self.check_online()?;
        Ok(self
            .records
            .lock()
            .await
            .values()
            .find(|r| r.refresh_token == token && r.is_refreshable(now))
            .cloned())
    }

    async fn find_active_by_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<TokenRecord>> {
        self.check_online()?;
        Ok(self
            .records
            .lock()
            .await
            .values()
            .find(|r| r.access_token == token && r.is_accessible(now))
            .cloned())
    }

    async fn revoke(&self, criteria: &RevokeCriteria) -> AuthResult<u64> {
        self.check_online()?;
        let mut records = self.records.lock().await;
        let mut revoked = 0;

        for record in records.values_mut().filter(|r| !r.is_revoked) {
            let matches = match criteria {
                RevokeCriteria::TokenId(id) => record.id == *id,
                RevokeCriteria::RefreshToken(token) => record.refresh_token == *token,
                RevokeCriteria::AccessToken(token) => record.access_token == *token,
                RevokeCriteria::AllForUser(user_id) => record.user_id == *user_id,
            };
            if matches {
                record.is_revoked = true;
                revoked += 1;
            }
        }

        Ok(revoked)
    }

    async fn touch(&self, id: TokenId, now: DateTime<Utc>) -> AuthResult<()> {
        self.check_online()?;
        if let Some(record) = self.records.lock().await.get_mut(&id) {
            record.last_used_at = Some(now);
        }
        Ok(())
    }

    async fn blacklist(&self, id: TokenId) -> AuthResult<bool> {
        self.check_online()?;
        Ok(match self.records.lock().await.get_mut(&id) {
            Some(record) => {
                record.is_blacklisted = true;
                true
            }
            None => false,
        })
    }

    async fn list_active_for_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<TokenRecord>> {
        self.check_online()?;
        let mut active: Vec<TokenRecord> = self
            .records
            .lock()
            .await
            .values()
            .filter(|r| r.user_id == user_id && r.is_refreshable(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        self.check_online()?;
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| r.refresh_token_expires_at > now && !r.is_revoked);
        Ok((before - records.len()) as u64)
    }
}

#[derive(Debug, Clone)]
struct StoredUser {
    user: AuthUser,
    password_hash: String,
    last_seen_at: Option<DateTime<Utc>>,
}

/// User directory held in process memory
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<HashMap<UserId, StoredUser>>,
    pepper: String,
}

impl InMemoryUserDirectory {
    pub fn new(pepper: impl Into<String>) -> Self {
        Self {
            users: Mutex::default(),
            pepper: pepper.into(),
        }
    }

    /// Register `user` with `password`. The email is stored normalized.
    pub async fn add_user(&self, mut user: AuthUser, password: &str) -> AuthResult<()> {
        user.email = normalize_email(&user.email);
        let password_hash = password::hash_password(password, &self.pepper)?;
        self.users.lock().await.insert(
            user.id.clone(),
            StoredUser {
                user,
                password_hash,
                last_seen_at: None,
            },
        );
        Ok(())
    }

    pub async fn last_seen(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.users
            .lock()
            .await
            .get(user_id)
            .and_then(|stored| stored.last_seen_at)
    }

    pub async fn remove_user(&self, user_id: &str) {
        self.users.lock().await.remove(user_id);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<Option<AuthUser>> {
        let email = normalize_email(email);
        let candidate = self
            .users
            .lock()
            .await
            .values()
            .find(|stored| stored.user.email == email)
            .cloned();

        let matched = password::verify_password_or_dummy(
            password,
            &self.pepper,
            candidate.as_ref().map(|stored| stored.password_hash.as_str()),
        );

        Ok(candidate.filter(|_| matched).map(|stored| stored.user))
    }

    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<AuthUser>> {
        Ok(self
            .users
            .lock()
            .await
            .get(user_id)
            .map(|stored| stored.user.clone()))
    }

    async fn mark_seen(&self, user_id: &str, now: DateTime<Utc>) -> AuthResult<()> {
        if let Some(stored) = self.users.lock().await.get_mut(user_id) {
            stored.last_seen_at = Some(now);
        }
        Ok(())
    }
}
