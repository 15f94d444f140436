//! Core authentication types
//!
//! Shared types used across all authentication components.

use portico_db::DbUser;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AuthError;

// =============================================================================
// Roles
// =============================================================================

/// User roles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Regular user
    #[default]
    User,
    /// Administrator
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(AuthError::InvalidInput(format!("Unknown role: {}", other))),
        }
    }
}

// =============================================================================
// Session Tokens
// =============================================================================

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (numeric user ID as a string)
    pub sub: String,
    /// User role
    pub role: UserRole,
    /// User email
    pub email: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

impl SessionClaims {
    /// Numeric subject; `None` for a non-numeric `sub`
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// Verified identity of a session holder, produced by the session gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: i64,
    pub role: UserRole,
    pub email: String,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Verified identity of a machine client, produced by the key gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientContext {
    pub id: i64,
    pub name: String,
}

/// Token plus the user it was minted for
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user: DbUser,
}

/// Role stored on a user row; unknown values degrade to `User`
pub fn role_of(user: &DbUser) -> UserRole {
    user.role.parse().unwrap_or_default()
}
