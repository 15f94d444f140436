//! Database models - mapped from PostgreSQL tables

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Identity
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbUser {
    pub id: i64,
    pub username: Option<String>,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: String,
    pub profile_picture_url: Option<String>,
    pub is_email_verified: bool,
    pub oauth_provider: Option<String>,
    pub oauth_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbUser {
    pub fn has_credential(&self) -> bool {
        self.password_hash.is_some()
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbVerificationCode {
    pub id: i64,
    pub user_id: i64,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Reset token row; `token` holds the SHA-256 digest, never the raw value
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbPasswordResetToken {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Machine clients
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbApiClient {
    pub id: i64,
    pub name: String,
    pub api_key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Write inputs
// ============================================================================

/// User created by direct registration (credential set up front)
#[derive(Debug, Clone)]
pub struct NewPasswordUser {
    pub email: String,
    pub username: Option<String>,
    pub password_hash: String,
}

/// Identity asserted by an OAuth provider
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub provider: String,
    pub provider_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
}

impl OAuthProfile {
    /// Username for a freshly created account: the display name if given,
    /// otherwise the local part of the email.
    pub fn username_candidate(&self) -> String {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .unwrap_or_else(|| {
                self.email
                    .split('@')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            })
    }
}

/// Self-service profile edit; `None` keeps the stored value
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub profile_picture_url: Option<String>,
}

/// Rows removed by a maintenance purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub verification_codes: u64,
    pub reset_tokens: u64,
}
