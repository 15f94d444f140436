//! Authentication configuration
//!
//! Centralized configuration for every authentication component. Durations
//! are written in humantime form (`30d`, `10m`, `60s`) in config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Session token signing
    pub jwt: JwtConfig,
    /// Password hashing and policy
    pub password: PasswordConfig,
    /// Verification codes and reset tokens
    pub one_time: OneTimeConfig,
    /// API client cache
    pub api_key: ApiKeyConfig,
    /// Session cookie transport
    pub session: SessionConfig,
    /// Registration entry points
    pub registration: RegistrationConfig,
}

/// JWT token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Secret key for signing tokens (should be at least 256 bits)
    pub secret: String,
    /// Token issuer claim
    pub issuer: String,
    /// Session token lifetime
    #[serde(with = "humantime_serde")]
    pub token_lifetime: Duration,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(), // Must be set in production
            issuer: "portico".to_string(),
            token_lifetime: Duration::from_secs(30 * 24 * 60 * 60), // 30 days
        }
    }
}

/// Password hashing configuration (Argon2id)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KiB (OWASP recommends 19456 KiB = 19 MiB minimum)
    pub memory_cost: u32,
    /// Time cost (iterations) - OWASP recommends 2 minimum
    pub time_cost: u32,
    /// Parallelism factor
    pub parallelism: u32,
    /// Output hash length in bytes
    pub hash_length: u32,
    /// Pepper (additional secret, optional)
    pub pepper: Option<String>,
    /// Minimum password length
    pub min_length: usize,
    /// Maximum password length (to bound hashing cost)
    pub max_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 19456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
            hash_length: 32,
            pepper: None,
            min_length: 6,
            max_length: 200,
        }
    }
}

/// Lifetimes of one-time secrets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OneTimeConfig {
    #[serde(with = "humantime_serde")]
    pub verification_code_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub reset_token_ttl: Duration,
    /// Random bytes in a raw reset token before hex encoding
    pub reset_token_bytes: usize,
}

impl Default for OneTimeConfig {
    fn default() -> Self {
        Self {
            verification_code_ttl: Duration::from_secs(10 * 60),
            reset_token_ttl: Duration::from_secs(60 * 60),
            reset_token_bytes: 32,
        }
    }
}

/// API client cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeyConfig {
    /// How long a loaded client snapshot is trusted
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
        }
    }
}

/// SameSite attribute of the session cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// Only send the cookie over HTTPS
    pub cookie_secure: bool,
    pub cookie_same_site: SameSitePolicy,
    /// Cookie max-age when the client asked to be remembered
    #[serde(with = "humantime_serde")]
    pub remember_max_age: Duration,
    /// Cookie max-age otherwise
    #[serde(with = "humantime_serde")]
    pub default_max_age: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "token".to_string(),
            cookie_secure: true,
            cookie_same_site: SameSitePolicy::None,
            remember_max_age: Duration::from_secs(30 * 24 * 60 * 60),
            default_max_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl SessionConfig {
    pub fn max_age(&self, remember: bool) -> Duration {
        if remember {
            self.remember_max_age
        } else {
            self.default_max_age
        }
    }
}

/// Registration entry points
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Accept `{email, password, username?}` registrations that skip the
    /// verification code
    pub allow_direct: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self { allow_direct: true }
    }
}

impl AuthConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(secret) = std::env::var("JWT_SECRET") {
            config.jwt.secret = secret;
        }
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            config.jwt.issuer = issuer;
        }
        if let Ok(pepper) = std::env::var("PASSWORD_PEPPER") {
            config.password.pepper = Some(pepper);
        }
        // Seconds
        if let Some(secs) = std::env::var("API_KEY_CACHE_TTL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.api_key.cache_ttl = Duration::from_secs(secs);
        }

        config
    }

    /// Validate the configuration, reporting every problem at once
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.jwt.secret.is_empty() {
            errors.push("JWT secret must be set".to_string());
        } else if self.jwt.secret.len() < 32 {
            errors.push("JWT secret should be at least 256 bits (32 bytes)".to_string());
        }
        if self.jwt.token_lifetime.is_zero() {
            errors.push("JWT token lifetime must be positive".to_string());
        }

        if self.password.memory_cost < 19456 {
            errors.push(
                "Argon2 memory cost should be at least 19456 KiB (OWASP recommendation)".to_string(),
            );
        }
        if self.password.time_cost < 2 {
            errors.push("Argon2 time cost should be at least 2 (OWASP recommendation)".to_string());
        }
        if self.password.min_length == 0 || self.password.min_length > self.password.max_length {
            errors.push("Password length bounds are inconsistent".to_string());
        }

        if self.one_time.reset_token_bytes < 32 {
            errors.push("Reset tokens need at least 32 random bytes".to_string());
        }
        if self.session.cookie_name.is_empty() {
            errors.push("Session cookie name must be set".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
