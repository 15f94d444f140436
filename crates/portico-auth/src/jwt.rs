//! JWT Token Service
//!
//! Stateless HS256 session tokens carrying `{sub, role, email}`. There is no
//! revocation list: a token is valid until its `exp`, or until the signing
//! secret is rotated.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::types::{SessionClaims, UserRole};

/// JWT service for token management
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    /// Create a new JWT service
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Sign a session token for the given identity
    pub fn sign(&self, user_id: i64, role: UserRole, email: &str) -> AuthResult<String> {
        let now = Utc::now();
        let exp = now
            + Duration::from_std(self.config.token_lifetime)
                .map_err(|e| AuthError::Internal(e.to_string()))?;

        let claims = SessionClaims {
            sub: user_id.to_string(),
            role,
            email: email.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to encode session token: {}", e)))
    }

    /// Verify a session token. Forged, malformed, expired and wrong-shape
    /// tokens all fail with `InvalidToken`.
    pub fn verify(&self, token: &str) -> AuthResult<SessionClaims> {
        let claims = decode::<SessionClaims>(token, &self.decoding_key, &self.validation())?.claims;

        if claims.user_id().is_none() {
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation
    }
}
