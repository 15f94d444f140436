//! API client repository

use sqlx::PgPool;

use crate::models::DbApiClient;
use crate::{DbError, DbResult};

/// Registered machine clients and their keys
pub struct ApiClientRepo {
    pool: PgPool,
}

impl ApiClientRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> DbResult<Vec<DbApiClient>> {
        let clients = sqlx::query_as::<_, DbApiClient>(
            "SELECT id, name, api_key, is_active, created_at FROM api_clients ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(clients)
    }

    pub async fn list_active(&self) -> DbResult<Vec<DbApiClient>> {
        let clients = sqlx::query_as::<_, DbApiClient>(
            r#"
            SELECT id, name, api_key, is_active, created_at
            FROM api_clients
            WHERE is_active = TRUE
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(clients)
    }

    pub async fn create(&self, name: &str, api_key: &str) -> DbResult<DbApiClient> {
        let client = sqlx::query_as::<_, DbApiClient>(
            r#"
            INSERT INTO api_clients (name, api_key, is_active)
            VALUES ($1, $2, TRUE)
            RETURNING id, name, api_key, is_active, created_at
            "#,
        )
        .bind(name)
        .bind(api_key)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from_write)?;

        Ok(client)
    }

    pub async fn set_active(&self, client_id: i64, is_active: bool) -> DbResult<Option<DbApiClient>> {
        let client = sqlx::query_as::<_, DbApiClient>(
            r#"
            UPDATE api_clients SET is_active = $2
            WHERE id = $1
            RETURNING id, name, api_key, is_active, created_at
            "#,
        )
        .bind(client_id)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }
}
