//! Database error types

use std::fmt;
use thiserror::Error;

/// Unique column (or column group) whose constraint rejected a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Email,
    Username,
    OAuthIdentity,
    ApiKey,
}

impl DuplicateField {
    /// Map a Postgres constraint name to the field it guards
    pub fn from_constraint(constraint: &str) -> Option<Self> {
        match constraint {
            "users_email_key" => Some(Self::Email),
            "users_username_key" => Some(Self::Username),
            "users_oauth_identity_key" => Some(Self::OAuthIdentity),
            "api_clients_api_key_key" => Some(Self::ApiKey),
            _ => None,
        }
    }
}

impl fmt::Display for DuplicateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Username => write!(f, "username"),
            Self::OAuthIdentity => write!(f, "oauth identity"),
            Self::ApiKey => write!(f, "api key"),
        }
    }
}

/// Database operation errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Duplicate {0}")]
    Duplicate(DuplicateField),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DbError {
    /// Translate a unique-constraint violation into `Duplicate`, leaving
    /// every other error as a plain query error.
    pub fn from_write(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if let Some(field) = db_err.constraint().and_then(DuplicateField::from_constraint) {
                return DbError::Duplicate(field);
            }
        }
        DbError::Query(err)
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
