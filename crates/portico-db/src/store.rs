//! Identity Store Gateway
//!
//! Every method is one logical transaction. Absence is reported as `None`
//! (or `false` for conditional writes) so callers decide whether a missing
//! row is an error. Emails are expected to be normalized to lowercase by the
//! caller; implementations lowercase again before touching storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;

use crate::error::DbResult;
use crate::models::{
    DbApiClient, DbPasswordResetToken, DbUser, DbVerificationCode, NewPasswordUser, OAuthProfile,
    ProfilePatch, PurgeStats,
};

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Cheap round-trip used by readiness checks
    async fn ping(&self) -> DbResult<()>;

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    async fn find_user_by_id(&self, id: i64) -> DbResult<Option<DbUser>>;

    async fn find_user_by_email(&self, email: &str) -> DbResult<Option<DbUser>>;

    async fn find_user_by_oauth(&self, provider: &str, provider_id: &str) -> DbResult<Option<DbUser>>;

    /// Insert an unverified email-only user, or return the existing row for
    /// that email. Never fails on an existing email.
    async fn create_unverified_by_email(&self, email: &str) -> DbResult<DbUser>;

    /// Insert a verified user holding a credential (direct registration).
    /// Fails with `Duplicate(Email)` or `Duplicate(Username)`.
    async fn create_user_with_password(&self, user: &NewPasswordUser) -> DbResult<DbUser>;

    /// Set username and credential. Fails with `Duplicate(Username)`.
    async fn complete_profile(
        &self,
        user_id: i64,
        username: &str,
        password_hash: &str,
    ) -> DbResult<Option<DbUser>>;

    /// Resolve an OAuth identity: by provider id, else by email (linking),
    /// else create. Every path leaves the user verified.
    async fn upsert_oauth_identity(&self, profile: &OAuthProfile) -> DbResult<DbUser>;

    async fn set_credential(&self, user_id: i64, password_hash: &str) -> DbResult<Option<DbUser>>;

    async fn update_profile(&self, user_id: i64, patch: &ProfilePatch) -> DbResult<Option<DbUser>>;

    async fn set_role(&self, user_id: i64, role: &str) -> DbResult<Option<DbUser>>;

    // ------------------------------------------------------------------
    // Verification codes
    // ------------------------------------------------------------------

    /// Store a code, superseding every earlier code of the user
    async fn store_verification_code(
        &self,
        user_id: i64,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<DbVerificationCode>;

    /// The newest unexpired code of the user, if it equals `code`
    async fn find_valid_code(&self, user_id: i64, code: &str) -> DbResult<Option<DbVerificationCode>>;

    /// Consume `code_id` and mark the user verified. Returns `false` when the
    /// code was already consumed.
    async fn consume_code(&self, user_id: i64, code_id: i64) -> DbResult<bool>;

    // ------------------------------------------------------------------
    // Password reset tokens
    // ------------------------------------------------------------------

    async fn store_reset_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<DbPasswordResetToken>;

    /// Unused, unexpired token with this digest
    async fn find_valid_reset_token(&self, token_hash: &str) -> DbResult<Option<DbPasswordResetToken>>;

    /// Conditional `used = false -> true`. Returns whether this call won.
    async fn mark_reset_token_used(&self, token_id: i64) -> DbResult<bool>;

    /// Mark the token used and replace the user's credential in one
    /// transaction. Returns `false` (and writes nothing) when the token was
    /// already used or has expired.
    async fn redeem_reset_token(
        &self,
        token_id: i64,
        user_id: i64,
        password_hash: &str,
    ) -> DbResult<bool>;

    // ------------------------------------------------------------------
    // API clients
    // ------------------------------------------------------------------

    async fn list_clients(&self) -> DbResult<Vec<DbApiClient>>;

    /// Fails with `Duplicate(ApiKey)`
    async fn create_client(&self, name: &str, api_key: &str) -> DbResult<DbApiClient>;

    async fn set_client_active(&self, client_id: i64, is_active: bool) -> DbResult<Option<DbApiClient>>;

    async fn load_active_clients(&self) -> DbResult<Vec<DbApiClient>>;

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Delete expired codes and expired or used reset tokens
    async fn purge_expired(&self) -> DbResult<PurgeStats>;
}

/// Constant-time equality for stored codes
pub(crate) fn codes_match(stored: &str, candidate: &str) -> bool {
    stored.as_bytes().ct_eq(candidate.as_bytes()).into()
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
