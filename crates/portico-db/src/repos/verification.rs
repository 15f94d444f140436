//! Email verification code repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::DbVerificationCode;
use crate::store::codes_match;
use crate::DbResult;

/// Verification code repository
pub struct CodeRepo {
    pool: PgPool,
}

impl CodeRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Replace every outstanding code of the user with a new one
    pub async fn store(
        &self,
        user_id: i64,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<DbVerificationCode> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM verification_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let stored = sqlx::query_as::<_, DbVerificationCode>(
            r#"
            INSERT INTO verification_codes (user_id, code, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, code, expires_at, created_at
            "#,
        )
        .bind(user_id)
        .bind(code)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    /// Newest unexpired code, returned only when it matches
    pub async fn find_valid(&self, user_id: i64, code: &str) -> DbResult<Option<DbVerificationCode>> {
        let newest = sqlx::query_as::<_, DbVerificationCode>(
            r#"
            SELECT id, user_id, code, expires_at, created_at
            FROM verification_codes
            WHERE user_id = $1 AND expires_at > NOW()
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(newest.filter(|row| codes_match(&row.code, code)))
    }

    /// Delete the code and flip the user to verified. The first DELETE
    /// takes the row lock, so a concurrent consumer sees zero rows.
    pub async fn consume(&self, user_id: i64, code_id: i64) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            "DELETE FROM verification_codes WHERE id = $1 AND user_id = $2 AND expires_at > NOW()",
        )
        .bind(code_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM verification_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE users SET is_email_verified = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Delete expired codes
    pub async fn purge_expired(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM verification_codes WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
