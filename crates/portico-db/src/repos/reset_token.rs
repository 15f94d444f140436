//! Password reset token repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::DbPasswordResetToken;
use crate::DbResult;

pub struct ResetTokenRepo {
    pool: PgPool,
}

impl ResetTokenRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn store(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<DbPasswordResetToken> {
        let token = sqlx::query_as::<_, DbPasswordResetToken>(
            r#"
            INSERT INTO password_reset_tokens (user_id, token, expires_at, is_used)
            VALUES ($1, $2, $3, FALSE)
            RETURNING id, user_id, token, expires_at, is_used, created_at
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    pub async fn find_valid(&self, token_hash: &str) -> DbResult<Option<DbPasswordResetToken>> {
        let token = sqlx::query_as::<_, DbPasswordResetToken>(
            r#"
            SELECT id, user_id, token, expires_at, is_used, created_at
            FROM password_reset_tokens
            WHERE token = $1 AND is_used = FALSE AND expires_at > NOW()
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    pub async fn mark_used(&self, token_id: i64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE password_reset_tokens SET is_used = TRUE WHERE id = $1 AND is_used = FALSE",
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Mark the token used and swap the credential atomically
    pub async fn redeem(&self, token_id: i64, user_id: i64, password_hash: &str) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            UPDATE password_reset_tokens
            SET is_used = TRUE
            WHERE id = $1 AND user_id = $2 AND is_used = FALSE AND expires_at > NOW()
            "#,
        )
        .bind(token_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let updated = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Delete used or expired tokens
    pub async fn purge(&self) -> DbResult<u64> {
        let result =
            sqlx::query("DELETE FROM password_reset_tokens WHERE is_used OR expires_at <= NOW()")
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}
