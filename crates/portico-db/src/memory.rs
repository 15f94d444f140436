//! In-memory `IdentityStore` for tests
//!
//! Mirrors the PostgreSQL constraints (unique email, username, OAuth
//! identity and API key) so that flows exercised against it behave the same
//! as against the real database. Each method takes the lock once and never
//! awaits while holding it, which gives the same per-call atomicity as a
//! database transaction.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{DbError, DbResult, DuplicateField};
use crate::models::{
    DbApiClient, DbPasswordResetToken, DbUser, DbVerificationCode, NewPasswordUser, OAuthProfile,
    ProfilePatch, PurgeStats,
};
use crate::store::{codes_match, normalize_email, IdentityStore};

#[derive(Default)]
struct State {
    next_id: i64,
    users: BTreeMap<i64, DbUser>,
    codes: Vec<DbVerificationCode>,
    reset_tokens: Vec<DbPasswordResetToken>,
    clients: BTreeMap<i64, DbApiClient>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_by_email(&self, email: &str) -> Option<&DbUser> {
        self.users.values().find(|u| u.email == email)
    }

    fn username_taken(&self, username: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.username.as_deref() == Some(username) && Some(u.id) != except)
    }

    fn insert_user(
        &mut self,
        email: String,
        username: Option<String>,
        password_hash: Option<String>,
        is_email_verified: bool,
    ) -> DbResult<DbUser> {
        if self.user_by_email(&email).is_some() {
            return Err(DbError::Duplicate(DuplicateField::Email));
        }
        if let Some(name) = username.as_deref() {
            if self.username_taken(name, None) {
                return Err(DbError::Duplicate(DuplicateField::Username));
            }
        }

        let now = Utc::now();
        let user = DbUser {
            id: self.next_id(),
            username,
            email,
            password_hash,
            role: "user".to_string(),
            profile_picture_url: None,
            is_email_verified,
            oauth_provider: None,
            oauth_id: None,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }
}

/// Thread-safe in-memory identity store
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored verification codes, expired ones included
    pub fn verification_code_count(&self) -> usize {
        self.state.lock().codes.len()
    }

    /// Number of stored reset tokens, used ones included
    pub fn reset_token_count(&self) -> usize {
        self.state.lock().reset_tokens.len()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }

    async fn find_user_by_id(&self, id: i64) -> DbResult<Option<DbUser>> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> DbResult<Option<DbUser>> {
        let email = normalize_email(email);
        Ok(self.state.lock().user_by_email(&email).cloned())
    }

    async fn find_user_by_oauth(&self, provider: &str, provider_id: &str) -> DbResult<Option<DbUser>> {
        let state = self.state.lock();
        Ok(state
            .users
            .values()
            .find(|u| {
                u.oauth_provider.as_deref() == Some(provider)
                    && u.oauth_id.as_deref() == Some(provider_id)
            })
            .cloned())
    }

    async fn create_unverified_by_email(&self, email: &str) -> DbResult<DbUser> {
        let email = normalize_email(email);
        let mut state = self.state.lock();
        if let Some(existing) = state.user_by_email(&email) {
            return Ok(existing.clone());
        }
        state.insert_user(email, None, None, false)
    }

    async fn create_user_with_password(&self, user: &NewPasswordUser) -> DbResult<DbUser> {
        let mut state = self.state.lock();
        state.insert_user(
            normalize_email(&user.email),
            user.username.clone(),
            Some(user.password_hash.clone()),
            true,
        )
    }

    async fn complete_profile(
        &self,
        user_id: i64,
        username: &str,
        password_hash: &str,
    ) -> DbResult<Option<DbUser>> {
        let mut state = self.state.lock();
        if state.username_taken(username, Some(user_id)) {
            return Err(DbError::Duplicate(DuplicateField::Username));
        }
        Ok(state.users.get_mut(&user_id).map(|user| {
            user.username = Some(username.to_string());
            user.password_hash = Some(password_hash.to_string());
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn upsert_oauth_identity(&self, profile: &OAuthProfile) -> DbResult<DbUser> {
        let email = normalize_email(&profile.email);
        let mut state = self.state.lock();
        let now = Utc::now();

        let linked = state.users.values_mut().find(|u| {
            u.oauth_provider.as_deref() == Some(profile.provider.as_str())
                && u.oauth_id.as_deref() == Some(profile.provider_id.as_str())
        });
        if let Some(user) = linked {
            user.is_email_verified = true;
            user.updated_at = now;
            return Ok(user.clone());
        }

        let candidate = profile.username_candidate();
        let username = (!candidate.is_empty() && !state.username_taken(&candidate, None))
            .then_some(candidate);

        if let Some(user) = state.users.values_mut().find(|u| u.email == email) {
            user.oauth_provider = Some(profile.provider.clone());
            user.oauth_id = Some(profile.provider_id.clone());
            user.is_email_verified = true;
            if profile.picture_url.is_some() {
                user.profile_picture_url = profile.picture_url.clone();
            }
            if user.username.is_none() {
                user.username = username;
            }
            user.updated_at = now;
            return Ok(user.clone());
        }

        let mut user = state.insert_user(email, username, None, true)?;
        user.oauth_provider = Some(profile.provider.clone());
        user.oauth_id = Some(profile.provider_id.clone());
        user.profile_picture_url = profile.picture_url.clone();
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_credential(&self, user_id: i64, password_hash: &str) -> DbResult<Option<DbUser>> {
        let mut state = self.state.lock();
        Ok(state.users.get_mut(&user_id).map(|user| {
            user.password_hash = Some(password_hash.to_string());
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn update_profile(&self, user_id: i64, patch: &ProfilePatch) -> DbResult<Option<DbUser>> {
        let mut state = self.state.lock();
        if let Some(name) = patch.username.as_deref() {
            if state.username_taken(name, Some(user_id)) {
                return Err(DbError::Duplicate(DuplicateField::Username));
            }
        }
        Ok(state.users.get_mut(&user_id).map(|user| {
            if let Some(name) = &patch.username {
                user.username = Some(name.clone());
            }
            if let Some(url) = &patch.profile_picture_url {
                user.profile_picture_url = Some(url.clone());
            }
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn set_role(&self, user_id: i64, role: &str) -> DbResult<Option<DbUser>> {
        let mut state = self.state.lock();
        Ok(state.users.get_mut(&user_id).map(|user| {
            user.role = role.to_string();
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn store_verification_code(
        &self,
        user_id: i64,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<DbVerificationCode> {
        let mut state = self.state.lock();
        state.codes.retain(|c| c.user_id != user_id);

        let stored = DbVerificationCode {
            id: state.next_id(),
            user_id,
            code: code.to_string(),
            expires_at,
            created_at: Utc::now(),
        };
        state.codes.push(stored.clone());
        Ok(stored)
    }

    async fn find_valid_code(&self, user_id: i64, code: &str) -> DbResult<Option<DbVerificationCode>> {
        let now = Utc::now();
        let state = self.state.lock();
        let newest = state
            .codes
            .iter()
            .filter(|c| c.user_id == user_id && c.expires_at > now)
            .max_by_key(|c| c.id);

        Ok(newest.filter(|c| codes_match(&c.code, code)).cloned())
    }

    async fn consume_code(&self, user_id: i64, code_id: i64) -> DbResult<bool> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let live = state
            .codes
            .iter()
            .any(|c| c.id == code_id && c.user_id == user_id && c.expires_at > now);
        if !live {
            return Ok(false);
        }

        state.codes.retain(|c| c.user_id != user_id);
        if let Some(user) = state.users.get_mut(&user_id) {
            user.is_email_verified = true;
            user.updated_at = now;
        }
        Ok(true)
    }

    async fn store_reset_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<DbPasswordResetToken> {
        let mut state = self.state.lock();
        let token = DbPasswordResetToken {
            id: state.next_id(),
            user_id,
            token: token_hash.to_string(),
            expires_at,
            is_used: false,
            created_at: Utc::now(),
        };
        state.reset_tokens.push(token.clone());
        Ok(token)
    }

    async fn find_valid_reset_token(&self, token_hash: &str) -> DbResult<Option<DbPasswordResetToken>> {
        let now = Utc::now();
        let state = self.state.lock();
        Ok(state
            .reset_tokens
            .iter()
            .filter(|t| t.token == token_hash && !t.is_used && t.expires_at > now)
            .max_by_key(|t| t.id)
            .cloned())
    }

    async fn mark_reset_token_used(&self, token_id: i64) -> DbResult<bool> {
        let mut state = self.state.lock();
        match state
            .reset_tokens
            .iter_mut()
            .find(|t| t.id == token_id && !t.is_used)
        {
            Some(token) => {
                token.is_used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn redeem_reset_token(
        &self,
        token_id: i64,
        user_id: i64,
        password_hash: &str,
    ) -> DbResult<bool> {
        let now = Utc::now();
        let mut state = self.state.lock();

        if !state.users.contains_key(&user_id) {
            return Ok(false);
        }
        let Some(token) = state.reset_tokens.iter_mut().find(|t| {
            t.id == token_id && t.user_id == user_id && !t.is_used && t.expires_at > now
        }) else {
            return Ok(false);
        };
        token.is_used = true;

        if let Some(user) = state.users.get_mut(&user_id) {
            user.password_hash = Some(password_hash.to_string());
            user.updated_at = now;
        }
        Ok(true)
    }

    async fn list_clients(&self) -> DbResult<Vec<DbApiClient>> {
        Ok(self.state.lock().clients.values().cloned().collect())
    }

    async fn create_client(&self, name: &str, api_key: &str) -> DbResult<DbApiClient> {
        let mut state = self.state.lock();
        if state.clients.values().any(|c| c.api_key == api_key) {
            return Err(DbError::Duplicate(DuplicateField::ApiKey));
        }

        let client = DbApiClient {
            id: state.next_id(),
            name: name.to_string(),
            api_key: api_key.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        state.clients.insert(client.id, client.clone());
        Ok(client)
    }

    async fn set_client_active(&self, client_id: i64, is_active: bool) -> DbResult<Option<DbApiClient>> {
        let mut state = self.state.lock();
        Ok(state.clients.get_mut(&client_id).map(|client| {
            client.is_active = is_active;
            client.clone()
        }))
    }

    async fn load_active_clients(&self) -> DbResult<Vec<DbApiClient>> {
        Ok(self
            .state
            .lock()
            .clients
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    async fn purge_expired(&self) -> DbResult<PurgeStats> {
        let now = Utc::now();
        let mut state = self.state.lock();

        let codes_before = state.codes.len();
        state.codes.retain(|c| c.expires_at > now);
        let tokens_before = state.reset_tokens.len();
        state.reset_tokens.retain(|t| !t.is_used && t.expires_at > now);

        Ok(PurgeStats {
            verification_codes: (codes_before - state.codes.len()) as u64,
            reset_tokens: (tokens_before - state.reset_tokens.len()) as u64,
        })
    }
}
