//! User DTOs

use chrono::{DateTime, Utc};
use portico_db::DbUser;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Public view of a user. Never carries the credential.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserDto {
    pub id: i64,
    pub username: Option<String>,
    pub email: String,
    pub role: String,
    pub profile_picture_url: Option<String>,
    pub is_email_verified: bool,
    /// Whether a password is set
    pub has_password: bool,
    pub oauth_provider: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbUser> for UserDto {
    fn from(user: DbUser) -> Self {
        Self {
            has_password: user.has_credential(),
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            profile_picture_url: user.profile_picture_url,
            is_email_verified: user.is_email_verified,
            oauth_provider: user.oauth_provider,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Self-service profile edit; absent fields keep their stored value
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    #[validate(length(min = 2, max = 50, message = "Username must be 2-50 characters"))]
    pub username: Option<String>,
    #[serde(default)]
    #[validate(url(message = "Invalid picture URL"))]
    pub profile_picture_url: Option<String>,
}
