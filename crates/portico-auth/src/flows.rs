//! Account flows
//!
//! Each flow normalizes its input, consults the identity store and, on
//! success, mints a session token. Store-level unique violations surface as
//! the specific conflict (`EmailAlreadyRegistered`, `UsernameTaken`,
//! `ApiKeyTaken`) through `From<DbError> for AuthError`.

use chrono::{DateTime, Utc};
use metrics::counter;
use portico_db::{DbApiClient, DbUser, NewPasswordUser, OAuthProfile, ProfilePatch};
use tracing::{debug, info, warn};

use crate::delivery::DeliveryMessage;
use crate::error::{AuthError, AuthResult};
use crate::one_time::{generate_api_key, generate_numeric_code, generate_opaque_token, hash_for_storage};
use crate::types::{role_of, AuthSession, UserRole};
use crate::AuthService;

fn record(event: &'static str) {
    counter!("portico_auth_events_total", "event" => event).increment(1);
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn expiry_after(ttl: std::time::Duration) -> AuthResult<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl).map_err(|e| AuthError::Internal(e.to_string()))?;
    Ok(Utc::now() + ttl)
}

fn required_username(username: &str) -> AuthResult<String> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AuthError::InvalidInput("Username is required".to_string()));
    }
    Ok(username.to_string())
}

impl AuthService {
    /// Mint a session token for a stored user
    pub fn issue_session(&self, user: DbUser) -> AuthResult<AuthSession> {
        let token = self.jwt.sign(user.id, role_of(&user), &user.email)?;
        Ok(AuthSession { token, user })
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Email-first registration: create (or reuse) the unverified user and
    /// send a fresh verification code. Only a verified email is a conflict.
    pub async fn register(&self, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);

        if let Some(existing) = self.store.find_user_by_email(&email).await? {
            if existing.is_email_verified {
                return Err(AuthError::EmailAlreadyRegistered);
            }
        }

        let user = self.store.create_unverified_by_email(&email).await?;
        self.send_verification_code(&user).await?;

        record("register");
        info!(user_id = user.id, "Registration started");
        Ok(())
    }

    async fn send_verification_code(&self, user: &DbUser) -> AuthResult<()> {
        let code = generate_numeric_code();
        let expires_at = expiry_after(self.config.one_time.verification_code_ttl)?;

        self.store
            .store_verification_code(user.id, &code, expires_at)
            .await?;

        self.delivery.deliver(DeliveryMessage::VerificationCode {
            email: user.email.clone(),
            code,
        });
        Ok(())
    }

    /// Direct registration: a verified user holding a credential, no code
    pub async fn register_direct(
        &self,
        email: &str,
        username: Option<&str>,
        password: &str,
    ) -> AuthResult<AuthSession> {
        if !self.config.registration.allow_direct {
            return Err(AuthError::InvalidInput(
                "Direct registration is disabled".to_string(),
            ));
        }

        self.password.validate_password(password)?;
        let username = username.map(required_username).transpose()?;
        let password_hash = self.password.hash_password(password)?;

        let user = self
            .store
            .create_user_with_password(&NewPasswordUser {
                email: normalize_email(email),
                username,
                password_hash,
            })
            .await?;

        record("register_direct");
        info!(user_id = user.id, "User registered");
        self.issue_session(user)
    }

    /// Consume the newest matching code and mark the email verified
    pub async fn verify_code(&self, email: &str, code: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let row = self
            .store
            .find_valid_code(user.id, code.trim())
            .await?
            .ok_or(AuthError::CodeInvalidOrExpired)?;

        // A concurrent verification may have consumed it first
        if !self.store.consume_code(user.id, row.id).await? {
            return Err(AuthError::CodeInvalidOrExpired);
        }

        record("verify");
        info!(user_id = user.id, "Email verified");
        Ok(())
    }

    /// Set username and password on a verified, credential-less account
    pub async fn complete_profile(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> AuthResult<AuthSession> {
        let username = required_username(username)?;
        self.password.validate_password(password)?;

        let email = normalize_email(email);
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.is_email_verified {
            return Err(AuthError::EmailNotVerified);
        }
        if user.has_credential() {
            return Err(AuthError::ProfileAlreadyCompleted);
        }

        let password_hash = self.password.hash_password(password)?;
        let updated = self
            .store
            .complete_profile(user.id, &username, &password_hash)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        info!(user_id = updated.id, "Profile completed");
        self.issue_session(updated)
    }

    // =========================================================================
    // Login
    // =========================================================================

    /// Password login. Unknown email, missing credential, unverified email
    /// and wrong password all yield the same `InvalidCredentials`.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        let email = normalize_email(email);

        let user = match self.store.find_user_by_email(&email).await? {
            Some(user) if user.is_email_verified => user,
            _ => {
                record("login_failure");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let verified = match user.password_hash.as_deref() {
            Some(hash) => self.password.verify_password(password, hash)?,
            None => false,
        };
        if !verified {
            record("login_failure");
            debug!(user_id = user.id, "Password login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        record("login_success");
        info!(user_id = user.id, "User logged in");
        self.issue_session(user)
    }

    /// OAuth login: link or create the account, then mint a session
    pub async fn oauth_login(&self, profile: OAuthProfile) -> AuthResult<AuthSession> {
        if profile.provider_id.trim().is_empty() {
            return Err(AuthError::InvalidInput("Missing OAuth id".to_string()));
        }

        let profile = OAuthProfile {
            email: normalize_email(&profile.email),
            ..profile
        };
        let user = self.store.upsert_oauth_identity(&profile).await?;

        record("oauth_login");
        info!(user_id = user.id, provider = %profile.provider, "OAuth login");
        self.issue_session(user)
    }

    // =========================================================================
    // Password reset
    // =========================================================================

    /// Always succeeds for unknown emails so accounts cannot be enumerated
    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let raw = generate_opaque_token(self.config.one_time.reset_token_bytes);
        let expires_at = expiry_after(self.config.one_time.reset_token_ttl)?;
        self.store
            .store_reset_token(user.id, &hash_for_storage(&raw), expires_at)
            .await?;

        self.delivery.deliver(DeliveryMessage::PasswordReset {
            email: user.email.clone(),
            token: raw,
        });

        record("forgot_password");
        info!(user_id = user.id, "Password reset token issued");
        Ok(())
    }

    /// Redeem a reset token. The token is marked used and the credential
    /// replaced in one store transaction, so a token works exactly once.
    pub async fn reset_password(&self, raw_token: &str, new_password: &str) -> AuthResult<()> {
        let raw_token = raw_token.trim();
        if raw_token.is_empty() {
            return Err(AuthError::InvalidInput("Missing token".to_string()));
        }

        let token = self
            .store
            .find_valid_reset_token(&hash_for_storage(raw_token))
            .await?
            .ok_or(AuthError::ResetTokenInvalidOrExpired)?;

        self.password.validate_password(new_password)?;
        let password_hash = self.password.hash_password(new_password)?;

        if !self
            .store
            .redeem_reset_token(token.id, token.user_id, &password_hash)
            .await?
        {
            warn!(user_id = token.user_id, "Reset token lost a redemption race");
            return Err(AuthError::ResetTokenInvalidOrExpired);
        }

        record("reset_password");
        info!(user_id = token.user_id, "Password reset");
        Ok(())
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// User behind a verified session. `UserNotFound` here means the token
    /// outlived its account; callers treat it as an authentication failure.
    pub async fn current_user(&self, user_id: i64) -> AuthResult<DbUser> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn update_profile(&self, user_id: i64, patch: ProfilePatch) -> AuthResult<DbUser> {
        let patch = ProfilePatch {
            username: patch.username.as_deref().map(required_username).transpose()?,
            ..patch
        };

        self.store
            .update_profile(user_id, &patch)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn set_role(&self, user_id: i64, role: UserRole) -> AuthResult<DbUser> {
        let user = self
            .store
            .set_role(user_id, role.as_str())
            .await?
            .ok_or(AuthError::UserNotFound)?;

        info!(user_id, role = %role, "Role changed");
        Ok(user)
    }

    // =========================================================================
    // API clients
    // =========================================================================

    pub async fn list_clients(&self) -> AuthResult<Vec<DbApiClient>> {
        Ok(self.store.list_clients().await?)
    }

    /// Register a client; a random key is generated when none is given
    pub async fn create_client(&self, name: &str, api_key: Option<&str>) -> AuthResult<DbApiClient> {
        let api_key = match api_key {
            Some(key) => key.to_string(),
            None => generate_api_key(),
        };

        let client = self.store.create_client(name.trim(), &api_key).await?;
        self.api_keys.invalidate();

        info!(client_id = client.id, "API client created");
        Ok(client)
    }

    pub async fn set_client_active(&self, client_id: i64, is_active: bool) -> AuthResult<DbApiClient> {
        let client = self
            .store
            .set_client_active(client_id, is_active)
            .await?
            .ok_or(AuthError::ClientNotFound)?;
        self.api_keys.invalidate();

        info!(client_id, is_active, "API client updated");
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::delivery::ChannelDelivery;
    use chrono::Duration;
    use portico_db::{IdentityStore, MemoryStore};
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        auth: AuthService,
        store: Arc<MemoryStore>,
        outbox: UnboundedReceiver<DeliveryMessage>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(test_config())
        }

        fn with_config(config: AuthConfig) -> Self {
            let store = Arc::new(MemoryStore::new());
            let (delivery, outbox) = ChannelDelivery::new();
            let auth = AuthService::new(store.clone(), Arc::new(delivery), config);
            Self { auth, store, outbox }
        }

        fn last_code(&mut self) -> String {
            match self.outbox.try_recv().unwrap() {
                DeliveryMessage::VerificationCode { code, .. } => code,
                other => panic!("unexpected delivery: {:?}", other),
            }
        }

        fn last_reset_token(&mut self) -> String {
            match self.outbox.try_recv().unwrap() {
                DeliveryMessage::PasswordReset { token, .. } => token,
                other => panic!("unexpected delivery: {:?}", other),
            }
        }

        async fn verified_user(&mut self, email: &str, password: &str) -> DbUser {
            self.auth.register(email).await.unwrap();
            let code = self.last_code();
            self.auth.verify_code(email, &code).await.unwrap();
            self.auth
                .complete_profile(email, email.split('@').next().unwrap(), password)
                .await
                .unwrap()
                .user
        }
    }

    fn test_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.jwt.secret = "test-secret-key-for-jwt-tokens-min-32-bytes!".to_string();
        config.password.memory_cost = 4096;
        config.password.time_cost = 1;
        config
    }

    #[tokio::test]
    async fn test_register_verify_complete_login() {
        let mut h = Harness::new();

        h.auth.register("A@B.com").await.unwrap();
        let code = h.last_code();
        h.auth.verify_code("a@b.com", &code).await.unwrap();

        let session = h.auth.complete_profile("a@b.com", "alice", "hunter22").await.unwrap();
        assert_eq!(session.user.username.as_deref(), Some("alice"));
        let claims = h.auth.jwt.verify(&session.token).unwrap();
        assert_eq!(claims.user_id(), Some(session.user.id));

        let login = h.auth.login("a@b.com", "hunter22").await.unwrap();
        assert_eq!(login.user.id, session.user.id);
    }

    #[tokio::test]
    async fn test_verify_code_succeeds_once() {
        let mut h = Harness::new();
        h.auth.register("a@b.com").await.unwrap();
        let code = h.last_code();

        h.auth.verify_code("a@b.com", &code).await.unwrap();
        let second = h.auth.verify_code("a@b.com", &code).await;
        assert!(matches!(second, Err(AuthError::CodeInvalidOrExpired)));
    }

    #[tokio::test]
    async fn test_only_latest_code_valid() {
        let h = Harness::new();
        h.auth.register("a@b.com").await.unwrap();
        let user = h.store.find_user_by_email("a@b.com").await.unwrap().unwrap();
        let expires_at = Utc::now() + Duration::minutes(10);
        h.store
            .store_verification_code(user.id, "111111", expires_at)
            .await
            .unwrap();
        h.store
            .store_verification_code(user.id, "222222", expires_at)
            .await
            .unwrap();

        let stale = h.auth.verify_code("a@b.com", "111111").await;
        assert!(matches!(stale, Err(AuthError::CodeInvalidOrExpired)));
        h.auth.verify_code("a@b.com", "222222").await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let h = Harness::new();
        h.auth.register("a@b.com").await.unwrap();
        let user = h.store.find_user_by_email("a@b.com").await.unwrap().unwrap();
        h.store
            .store_verification_code(user.id, "654321", Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        let result = h.auth.verify_code("a@b.com", "654321").await;
        assert!(matches!(result, Err(AuthError::CodeInvalidOrExpired)));
    }

    #[tokio::test]
    async fn test_verify_unknown_user() {
        let h = Harness::new();
        let result = h.auth.verify_code("nobody@b.com", "123456").await;
        assert!(matches!(result, Err(AuthError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_reregister_unverified_is_allowed() {
        let mut h = Harness::new();
        h.auth.register("a@b.com").await.unwrap();
        h.auth.register("a@b.com").await.unwrap();
        assert_eq!(h.store.verification_code_count(), 1);

        let code = h.last_code();
        assert!(!code.is_empty());
    }

    #[tokio::test]
    async fn test_register_verified_email_conflicts() {
        let mut h = Harness::new();
        h.verified_user("a@b.com", "hunter22").await;

        let result = h.auth.register("A@b.com").await;
        assert!(matches!(result, Err(AuthError::EmailAlreadyRegistered)));
    }

    #[tokio::test]
    async fn test_complete_profile_requires_verification() {
        let h = Harness::new();
        h.auth.register("a@b.com").await.unwrap();

        let result = h.auth.complete_profile("a@b.com", "alice", "hunter22").await;
        assert!(matches!(result, Err(AuthError::EmailNotVerified)));
    }

    #[tokio::test]
    async fn test_complete_profile_rules() {
        let mut h = Harness::new();
        h.verified_user("alice@b.com", "hunter22").await;

        // Already has a credential
        let again = h.auth.complete_profile("alice@b.com", "alice2", "hunter22").await;
        assert!(matches!(again, Err(AuthError::ProfileAlreadyCompleted)));

        // Username collision
        h.auth.register("bob@b.com").await.unwrap();
        let code = h.last_code();
        h.auth.verify_code("bob@b.com", &code).await.unwrap();
        let taken = h.auth.complete_profile("bob@b.com", "alice", "hunter22").await;
        assert!(matches!(taken, Err(AuthError::UsernameTaken)));

        // Weak password
        let weak = h.auth.complete_profile("bob@b.com", "bob", "12345").await;
        assert!(matches!(weak, Err(AuthError::WeakPassword(_))));
    }

    #[tokio::test]
    async fn test_login_errors_are_identical() {
        let mut h = Harness::new();
        h.verified_user("a@b.com", "hunter22").await;

        let unknown = h.auth.login("x@y.com", "wrong!").await.unwrap_err();
        let wrong = h.auth.login("a@b.com", "wrong!").await.unwrap_err();

        assert_eq!(unknown.error_code(), wrong.error_code());
        assert_eq!(unknown.client_message(), wrong.client_message());
        assert_eq!(unknown.status_code(), 401);
    }

    #[tokio::test]
    async fn test_login_without_credential_rejected() {
        let mut h = Harness::new();
        h.auth.register("a@b.com").await.unwrap();
        let code = h.last_code();
        h.auth.verify_code("a@b.com", &code).await.unwrap();

        let result = h.auth.login("a@b.com", "anything").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_direct_registration() {
        let h = Harness::new();
        let session = h
            .auth
            .register_direct("Direct@B.com", Some("direct"), "hunter22")
            .await
            .unwrap();
        assert!(session.user.is_email_verified);
        assert_eq!(session.user.email, "direct@b.com");

        let dup = h.auth.register_direct("direct@b.com", None, "hunter22").await;
        assert!(matches!(dup, Err(AuthError::EmailAlreadyRegistered)));

        let dup_name = h.auth.register_direct("other@b.com", Some("direct"), "hunter22").await;
        assert!(matches!(dup_name, Err(AuthError::UsernameTaken)));

        h.auth.login("direct@b.com", "hunter22").await.unwrap();
    }

    #[tokio::test]
    async fn test_direct_registration_disabled() {
        let mut config = test_config();
        config.registration.allow_direct = false;
        let h = Harness::with_config(config);

        let result = h.auth.register_direct("a@b.com", None, "hunter22").await;
        assert!(matches!(result, Err(AuthError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_oauth_login_converges() {
        let h = Harness::new();
        let profile = OAuthProfile {
            provider: "google".to_string(),
            provider_id: "g-1".to_string(),
            email: "G@B.com".to_string(),
            display_name: None,
            picture_url: None,
        };

        let first = h.auth.oauth_login(profile.clone()).await.unwrap();
        let second = h.auth.oauth_login(profile).await.unwrap();
        assert_eq!(first.user.id, second.user.id);
        assert!(first.user.is_email_verified);
        assert_eq!(first.user.email, "g@b.com");
    }

    #[tokio::test]
    async fn test_forgot_password_unknown_email_is_silent() {
        let mut h = Harness::new();
        h.auth.forgot_password("unknown@x.com").await.unwrap();
        assert!(h.outbox.try_recv().is_err());
        assert_eq!(h.store.reset_token_count(), 0);
    }

    #[tokio::test]
    async fn test_reset_password_once() {
        let mut h = Harness::new();
        h.verified_user("a@b.com", "hunter22").await;

        h.auth.forgot_password("a@b.com").await.unwrap();
        let token = h.last_reset_token();

        h.auth.reset_password(&token, "newpass1").await.unwrap();
        let replay = h.auth.reset_password(&token, "newpass2").await;
        assert!(matches!(replay, Err(AuthError::ResetTokenInvalidOrExpired)));

        h.auth.login("a@b.com", "newpass1").await.unwrap();
        assert!(h.auth.login("a@b.com", "hunter22").await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_reset_single_winner() {
        let mut h = Harness::new();
        h.verified_user("a@b.com", "hunter22").await;
        h.auth.forgot_password("a@b.com").await.unwrap();
        let token = h.last_reset_token();

        let (a, b) = tokio::join!(
            h.auth.reset_password(&token, "newpass1"),
            h.auth.reset_password(&token, "newpass2"),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    }

    #[tokio::test]
    async fn test_reset_token_is_stored_hashed() {
        let mut h = Harness::new();
        let user = h.verified_user("a@b.com", "hunter22").await;
        h.auth.forgot_password("a@b.com").await.unwrap();
        let raw = h.last_reset_token();

        assert!(h.store.find_valid_reset_token(&raw).await.unwrap().is_none());
        let stored = h
            .store
            .find_valid_reset_token(&hash_for_storage(&raw))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.user_id, user.id);
    }

    #[tokio::test]
    async fn test_expired_reset_token_rejected() {
        let mut h = Harness::new();
        let user = h.verified_user("a@b.com", "hunter22").await;
        h.store
            .store_reset_token(user.id, &hash_for_storage("old"), Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        let result = h.auth.reset_password("old", "newpass1").await;
        assert!(matches!(result, Err(AuthError::ResetTokenInvalidOrExpired)));
    }

    #[tokio::test]
    async fn test_client_mutations_invalidate_cache() {
        let h = Harness::new();
        let client = h.auth.create_client("billing", None).await.unwrap();
        assert_eq!(client.api_key.len(), 64);

        assert!(h.auth.api_keys.lookup(&client.api_key).await.unwrap().is_some());
        h.auth.set_client_active(client.id, false).await.unwrap();
        assert!(h.auth.api_keys.lookup(&client.api_key).await.unwrap().is_none());

        let missing = h.auth.set_client_active(9999, true).await;
        assert!(matches!(missing, Err(AuthError::ClientNotFound)));
    }

    #[tokio::test]
    async fn test_set_role_and_current_user() {
        let mut h = Harness::new();
        let user = h.verified_user("a@b.com", "hunter22").await;

        let promoted = h.auth.set_role(user.id, UserRole::Admin).await.unwrap();
        assert_eq!(promoted.role, "admin");

        let login = h.auth.login("a@b.com", "hunter22").await.unwrap();
        assert_eq!(h.auth.jwt.verify(&login.token).unwrap().role, UserRole::Admin);

        assert!(matches!(
            h.auth.current_user(9999).await,
            Err(AuthError::UserNotFound)
        ));
    }
}
