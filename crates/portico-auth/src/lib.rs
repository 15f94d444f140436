//! Portico Authentication Layer
//!
//! Identity flows for the Portico gateway:
//!
//! - **Session tokens**: stateless HS256 JWTs carrying `{sub, role, email}`
//! - **Passwords**: Argon2id with per-hash salt and optional pepper
//! - **One-time secrets**: six-digit email codes and hashed reset tokens
//! - **API clients**: static keys resolved through a short-TTL snapshot cache
//! - **Account flows**: registration, verification, login, OAuth, reset
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Request Flow                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │   Request ──► Session Gate ──► AuthContext ──► Handler        │
//! │          └──► Key Gate ─────► ClientContext ─► Handler        │
//! │                                                               │
//! │   Handler ──► AuthService ──┬──► PasswordService              │
//! │                             ├──► JwtService                   │
//! │                             ├──► one_time                     │
//! │                             ├──► IdentityStore                │
//! │                             └──► DeliverySink                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod api_key;
pub mod config;
pub mod delivery;
pub mod error;
mod flows;
pub mod jwt;
pub mod middleware;
pub mod one_time;
pub mod password;
pub mod types;

pub use api_key::ApiKeyCache;
pub use config::AuthConfig;
pub use delivery::{ChannelDelivery, DeliveryMessage, DeliverySink, LogDelivery};
pub use error::{AuthError, AuthResult, ErrorResponse};
pub use jwt::JwtService;
pub use password::PasswordService;
pub use types::*;

use axum::http::HeaderMap;
use portico_db::IdentityStore;
use std::sync::Arc;

/// Main authentication service combining all auth components
pub struct AuthService {
    pub jwt: JwtService,
    pub password: PasswordService,
    pub api_keys: ApiKeyCache,
    store: Arc<dyn IdentityStore>,
    delivery: Arc<dyn DeliverySink>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        delivery: Arc<dyn DeliverySink>,
        config: AuthConfig,
    ) -> Self {
        let jwt = JwtService::new(config.jwt.clone());
        let password = PasswordService::new(config.password.clone());
        let api_keys = ApiKeyCache::new(store.clone(), config.api_key.cache_ttl);

        Self {
            jwt,
            password,
            api_keys,
            store,
            delivery,
            config,
        }
    }

    /// Get the identity store
    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    /// Get the config reference
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Session gate over request headers
    pub fn authenticate(&self, headers: &HeaderMap) -> AuthResult<AuthContext> {
        middleware::authenticate_session(&self.jwt, headers, &self.config.session.cookie_name)
    }

    /// Optional session gate over request headers
    pub fn authenticate_optional(&self, headers: &HeaderMap) -> Option<AuthContext> {
        middleware::authenticate_optional(&self.jwt, headers, &self.config.session.cookie_name)
    }

    /// Key gate over request headers and query string
    pub async fn authenticate_client(
        &self,
        headers: &HeaderMap,
        query: Option<&str>,
    ) -> AuthResult<ClientContext> {
        middleware::authenticate_client(&self.api_keys, headers, query).await
    }
}
