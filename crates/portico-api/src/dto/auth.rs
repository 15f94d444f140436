//! Authentication DTOs

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::UserDto;

// =============================================================================
// Registration
// =============================================================================

/// Registration request. Without `password` this starts the email-code flow;
/// with it the account is created directly.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    /// Email address
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    /// Username (direct registration only)
    #[serde(default)]
    #[validate(length(min = 2, max = 50, message = "Username must be 2-50 characters"))]
    pub username: Option<String>,
    /// Password (direct registration only)
    #[serde(default)]
    #[validate(length(min = 6, max = 200, message = "Password must be 6-200 characters"))]
    pub password: Option<String>,
}

/// Verify code request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct VerifyCodeRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    /// Six-digit code from the verification email
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

/// Complete profile request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CompleteProfileRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 2, max = 50, message = "Username must be 2-50 characters"))]
    pub username: String,
    #[validate(length(min = 6, max = 200, message = "Password must be 6-200 characters"))]
    pub password: String,
    /// Longer-lived session cookie
    #[serde(default)]
    pub remember: bool,
}

// =============================================================================
// Login
// =============================================================================

/// Login request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    /// Email address
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    /// Password
    #[validate(length(min = 6, max = 200, message = "Password must be 6-200 characters"))]
    pub password: String,
    /// Remember me (longer session cookie)
    #[serde(default)]
    pub remember: bool,
}

/// Google sign-in, as relayed by the frontend
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OAuthLoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    /// Provider-side account id
    #[validate(length(min = 1, max = 255, message = "oauthId is required"))]
    pub oauth_id: String,
    #[serde(default)]
    #[validate(length(max = 50, message = "Username must be at most 50 characters"))]
    pub username: Option<String>,
    #[serde(default)]
    #[validate(url(message = "Invalid picture URL"))]
    pub picture_url: Option<String>,
    #[serde(default)]
    pub remember: bool,
}

/// Session issued by login, OAuth, complete-profile or direct registration
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionResponse {
    /// Bearer token, also set as the session cookie
    pub token: String,
    pub user: UserDto,
}

// =============================================================================
// Password Reset
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    /// Raw token from the reset link
    #[validate(length(min = 1, message = "Missing token"))]
    pub token: String,
    #[validate(length(min = 6, max = 200, message = "Password must be 6-200 characters"))]
    pub password: String,
}

// =============================================================================
// Status
// =============================================================================

/// Session status for the frontend
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserDto>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_shapes() {
        let email_only: RegisterRequest =
            serde_json::from_str(r#"{"email":"a@b.com"}"#).unwrap();
        assert!(email_only.password.is_none());
        assert!(email_only.validate().is_ok());

        let short: RegisterRequest =
            serde_json::from_str(r#"{"email":"a@b.com","password":"123"}"#).unwrap();
        assert!(short.validate().is_err());
    }

    #[test]
    fn test_oauth_request_is_camel_case() {
        let req: OAuthLoginRequest = serde_json::from_str(
            r#"{"email":"g@b.com","oauthId":"g-1","pictureUrl":"https://img.example.com/a.png"}"#,
        )
        .unwrap();
        assert_eq!(req.oauth_id, "g-1");
        assert!(req.validate().is_ok());
    }
}
