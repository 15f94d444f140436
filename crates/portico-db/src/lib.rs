//! Portico Identity Store
//!
//! PostgreSQL persistence for the identity subsystem: users, email
//! verification codes, password reset tokens and API clients.
//!
//! # Architecture
//!
//! - **`IdentityStore`**: the storage seam consumed by `portico-auth`
//! - **`Database`**: PostgreSQL implementation, one repository per table
//! - **`MemoryStore`**: in-process implementation for tests (`mock` feature)
//!
//! # Repository Pattern
//!
//! Each table has its own repository. Queries are plain runtime SQL; unique
//! constraint names are mapped to `DbError::Duplicate` by `DbError::from_write`.

pub mod config;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod memory;
pub mod models;
pub mod repos;
pub mod store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

pub use config::DatabaseConfig;
pub use error::{DbError, DbResult, DuplicateField};
#[cfg(any(test, feature = "mock"))]
pub use memory::MemoryStore;
pub use models::*;
pub use repos::*;
pub use store::IdentityStore;

/// PostgreSQL connection pool
#[derive(Clone)]
pub struct Database {
    pub pg: PgPool,
}

impl Database {
    /// Connect to PostgreSQL
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!("Connecting to PostgreSQL: {}", config.postgres_url_masked());

        let pg = PgPoolOptions::new()
            .max_connections(config.pg_max_connections)
            .min_connections(config.pg_min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.pg_acquire_timeout_secs))
            .connect(&config.postgres_url)
            .await
            .map_err(|e| DbError::Connection(format!("PostgreSQL: {}", e)))?;

        info!("Connected to PostgreSQL");

        Ok(Self { pg })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> DbResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pg)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
        info!("Migrations complete");
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> HealthStatus {
        let postgres = sqlx::query("SELECT 1").fetch_one(&self.pg).await.is_ok();

        HealthStatus {
            postgres,
            healthy: postgres,
        }
    }

    pub fn user_repo(&self) -> UserRepo {
        UserRepo::new(self.pg.clone())
    }

    pub fn code_repo(&self) -> CodeRepo {
        CodeRepo::new(self.pg.clone())
    }

    pub fn reset_token_repo(&self) -> ResetTokenRepo {
        ResetTokenRepo::new(self.pg.clone())
    }

    pub fn client_repo(&self) -> ApiClientRepo {
        ApiClientRepo::new(self.pg.clone())
    }
}

/// Health status of the database connection
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub postgres: bool,
    pub healthy: bool,
}

#[async_trait]
impl IdentityStore for Database {
    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pg).await?;
        Ok(())
    }

    async fn find_user_by_id(&self, id: i64) -> DbResult<Option<DbUser>> {
        self.user_repo().find_by_id(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> DbResult<Option<DbUser>> {
        self.user_repo().find_by_email(email).await
    }

    async fn find_user_by_oauth(&self, provider: &str, provider_id: &str) -> DbResult<Option<DbUser>> {
        self.user_repo().find_by_oauth(provider, provider_id).await
    }

    async fn create_unverified_by_email(&self, email: &str) -> DbResult<DbUser> {
        self.user_repo().create_unverified(email).await
    }

    async fn create_user_with_password(&self, user: &NewPasswordUser) -> DbResult<DbUser> {
        self.user_repo().create_with_password(user).await
    }

    async fn complete_profile(
        &self,
        user_id: i64,
        username: &str,
        password_hash: &str,
    ) -> DbResult<Option<DbUser>> {
        self.user_repo()
            .complete_profile(user_id, username, password_hash)
            .await
    }

    async fn upsert_oauth_identity(&self, profile: &OAuthProfile) -> DbResult<DbUser> {
        self.user_repo().upsert_oauth(profile).await
    }

    async fn set_credential(&self, user_id: i64, password_hash: &str) -> DbResult<Option<DbUser>> {
        self.user_repo().set_credential(user_id, password_hash).await
    }

    async fn update_profile(&self, user_id: i64, patch: &ProfilePatch) -> DbResult<Option<DbUser>> {
        self.user_repo().update_profile(user_id, patch).await
    }

    async fn set_role(&self, user_id: i64, role: &str) -> DbResult<Option<DbUser>> {
        self.user_repo().set_role(user_id, role).await
    }

    async fn store_verification_code(
        &self,
        user_id: i64,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<DbVerificationCode> {
        self.code_repo().store(user_id, code, expires_at).await
    }

    async fn find_valid_code(&self, user_id: i64, code: &str) -> DbResult<Option<DbVerificationCode>> {
        self.code_repo().find_valid(user_id, code).await
    }

    async fn consume_code(&self, user_id: i64, code_id: i64) -> DbResult<bool> {
        self.code_repo().consume(user_id, code_id).await
    }

    async fn store_reset_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<DbPasswordResetToken> {
        self.reset_token_repo()
            .store(user_id, token_hash, expires_at)
            .await
    }

    async fn find_valid_reset_token(&self, token_hash: &str) -> DbResult<Option<DbPasswordResetToken>> {
        self.reset_token_repo().find_valid(token_hash).await
    }

    async fn mark_reset_token_used(&self, token_id: i64) -> DbResult<bool> {
        self.reset_token_repo().mark_used(token_id).await
    }

    async fn redeem_reset_token(
        &self,
        token_id: i64,
        user_id: i64,
        password_hash: &str,
    ) -> DbResult<bool> {
        self.reset_token_repo()
            .redeem(token_id, user_id, password_hash)
            .await
    }

    async fn list_clients(&self) -> DbResult<Vec<DbApiClient>> {
        self.client_repo().list().await
    }

    async fn create_client(&self, name: &str, api_key: &str) -> DbResult<DbApiClient> {
        self.client_repo().create(name, api_key).await
    }

    async fn set_client_active(&self, client_id: i64, is_active: bool) -> DbResult<Option<DbApiClient>> {
        self.client_repo().set_active(client_id, is_active).await
    }

    async fn load_active_clients(&self) -> DbResult<Vec<DbApiClient>> {
        self.client_repo().list_active().await
    }

    async fn purge_expired(&self) -> DbResult<PurgeStats> {
        let verification_codes = self.code_repo().purge_expired().await?;
        let reset_tokens = self.reset_token_repo().purge().await?;

        Ok(PurgeStats {
            verification_codes,
            reset_tokens,
        })
    }
}
