//! Authentication error types
//!
//! Errors are designed to be:
//! - Informative for logging/debugging
//! - Safe for external exposure (no sensitive data leakage)
//! - Convertible to HTTP status codes

use portico_db::{DbError, DuplicateField};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    // =========================================================================
    // Gate Errors
    // =========================================================================
    /// No session credential was presented
    #[error("Authentication required")]
    Unauthenticated,

    /// Session token is malformed, forged, expired or of the wrong shape
    #[error("Invalid or expired session")]
    InvalidToken,

    /// No API key was presented
    #[error("API key required")]
    MissingApiKey,

    /// API key unknown or belongs to an inactive client
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Authenticated but not allowed
    #[error("Insufficient permissions")]
    InsufficientPermissions,

    // =========================================================================
    // Credential Errors
    // =========================================================================
    /// Unknown email, wrong password, or no usable credential. Always the
    /// same message so callers cannot probe for accounts.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Password does not meet requirements
    #[error("Password does not meet requirements: {0}")]
    WeakPassword(String),

    /// Malformed input that passed request-level validation
    #[error("{0}")]
    InvalidInput(String),

    // =========================================================================
    // Account State Errors
    // =========================================================================
    #[error("User not found")]
    UserNotFound,

    #[error("Client not found")]
    ClientNotFound,

    #[error("Email is not verified")]
    EmailNotVerified,

    #[error("Invalid or expired code")]
    CodeInvalidOrExpired,

    #[error("Invalid or expired token")]
    ResetTokenInvalidOrExpired,

    #[error("Profile already completed")]
    ProfileAlreadyCompleted,

    // =========================================================================
    // Conflicts
    // =========================================================================
    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Username already taken")]
    UsernameTaken,

    #[error("API key already in use")]
    ApiKeyTaken,

    #[error("Conflict: {0}")]
    Conflict(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Password hashing failed
    #[error("Password hashing failed")]
    PasswordHashingFailed,

    /// Internal error (should not be exposed to clients)
    #[error("Internal error")]
    Internal(String),
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::WeakPassword(_)
            | Self::InvalidInput(_)
            | Self::EmailNotVerified
            | Self::CodeInvalidOrExpired
            | Self::ResetTokenInvalidOrExpired => 400,

            // 401 Unauthorized
            Self::Unauthenticated
            | Self::InvalidToken
            | Self::MissingApiKey
            | Self::InvalidApiKey
            | Self::InvalidCredentials => 401,

            // 403 Forbidden
            Self::InsufficientPermissions => 403,

            // 404 Not Found
            Self::UserNotFound | Self::ClientNotFound => 404,

            // 409 Conflict
            Self::EmailAlreadyRegistered
            | Self::UsernameTaken
            | Self::ApiKeyTaken
            | Self::ProfileAlreadyCompleted
            | Self::Conflict(_) => 409,

            // 500 Internal Server Error
            Self::Database(_) | Self::PasswordHashingFailed | Self::Internal(_) => 500,
        }
    }

    /// Get an error code for the client (safe to expose)
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "AUTH_REQUIRED",
            Self::InvalidToken => "AUTH_INVALID",
            Self::MissingApiKey => "API_KEY_REQUIRED",
            Self::InvalidApiKey => "API_KEY_INVALID",
            Self::InsufficientPermissions => "FORBIDDEN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::WeakPassword(_) => "WEAK_PASSWORD",
            Self::InvalidInput(_) => "VALIDATION_ERROR",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::ClientNotFound => "CLIENT_NOT_FOUND",
            Self::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            Self::CodeInvalidOrExpired => "CODE_INVALID_OR_EXPIRED",
            Self::ResetTokenInvalidOrExpired => "RESET_TOKEN_INVALID_OR_EXPIRED",
            Self::ProfileAlreadyCompleted => "PROFILE_ALREADY_COMPLETED",
            Self::EmailAlreadyRegistered => "EMAIL_ALREADY_REGISTERED",
            Self::UsernameTaken => "USERNAME_TAKEN",
            Self::ApiKeyTaken => "API_KEY_TAKEN",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) | Self::PasswordHashingFailed | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Get safe message for client (doesn't leak internal details)
    pub fn client_message(&self) -> String {
        match self {
            Self::Database(_) | Self::PasswordHashingFailed | Self::Internal(_) => {
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Error response for API clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `false`
    pub ok: bool,
    /// Error code (machine-readable)
    pub code: String,
    /// Error message (human-readable)
    pub message: String,
}

impl From<&AuthError> for ErrorResponse {
    fn from(error: &AuthError) -> Self {
        Self {
            ok: false,
            code: error.error_code().to_string(),
            message: error.client_message(),
        }
    }
}

impl From<DbError> for AuthError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Duplicate(DuplicateField::Email) => Self::EmailAlreadyRegistered,
            DbError::Duplicate(DuplicateField::Username) => Self::UsernameTaken,
            DbError::Duplicate(DuplicateField::ApiKey) => Self::ApiKeyTaken,
            DbError::Duplicate(field) => Self::Conflict(format!("{} already exists", field)),
            other => Self::Database(other.to_string()),
        }
    }
}

// Every decode failure, expiry included, is reported identically
impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        Self::InvalidToken
    }
}
