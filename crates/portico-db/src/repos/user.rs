//! User repository

use sqlx::{PgPool, Postgres, Transaction};

use crate::models::{DbUser, NewPasswordUser, OAuthProfile, ProfilePatch};
use crate::store::normalize_email;
use crate::{DbError, DbResult, DuplicateField};

/// Resolution attempts before a unique violation is reported
const OAUTH_ATTEMPTS: u32 = 3;

const USER_COLUMNS: &str = "id, username, email, password_hash, role, profile_picture_url, \
     is_email_verified, oauth_provider, oauth_id, created_at, updated_at";

/// User repository for identity lookups and credential management
pub struct UserRepo {
    pool: PgPool,
}

impl UserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find user by ID
    pub async fn find_by_id(&self, id: i64) -> DbResult<Option<DbUser>> {
        let user = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find user by email
    pub async fn find_by_email(&self, email: &str) -> DbResult<Option<DbUser>> {
        let user = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find user by linked OAuth identity
    pub async fn find_by_oauth(&self, provider: &str, provider_id: &str) -> DbResult<Option<DbUser>> {
        let user = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE oauth_provider = $1 AND oauth_id = $2"
        ))
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Insert-or-fetch an email-only user. The no-op update makes the
    /// conflict branch return the existing row.
    pub async fn create_unverified(&self, email: &str) -> DbResult<DbUser> {
        let user = sqlx::query_as::<_, DbUser>(&format!(
            r#"
            INSERT INTO users (email, is_email_verified)
            VALUES ($1, FALSE)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(normalize_email(email))
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from_write)?;

        Ok(user)
    }

    /// Create a verified user that already holds a credential
    pub async fn create_with_password(&self, new_user: &NewPasswordUser) -> DbResult<DbUser> {
        let user = sqlx::query_as::<_, DbUser>(&format!(
            r#"
            INSERT INTO users (email, username, password_hash, is_email_verified)
            VALUES ($1, $2, $3, TRUE)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(normalize_email(&new_user.email))
        .bind(new_user.username.as_deref())
        .bind(&new_user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from_write)?;

        Ok(user)
    }

    /// Set username and credential after email verification
    pub async fn complete_profile(
        &self,
        user_id: i64,
        username: &str,
        password_hash: &str,
    ) -> DbResult<Option<DbUser>> {
        let user = sqlx::query_as::<_, DbUser>(&format!(
            r#"
            UPDATE users
            SET username = $2, password_hash = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(username)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from_write)?;

        Ok(user)
    }

    /// Link or create the account for an OAuth identity. A concurrent first
    /// login for the same identity or email makes this attempt lose on a
    /// unique constraint; the retry then finds the winner's row.
    pub async fn upsert_oauth(&self, profile: &OAuthProfile) -> DbResult<DbUser> {
        let email = normalize_email(&profile.email);
        let mut claim_username = true;
        let mut attempt = 1;

        loop {
            match self.resolve_oauth(profile, &email, claim_username).await {
                Ok(user) => return Ok(user),
                Err(err) if attempt < OAUTH_ATTEMPTS => {
                    claim_username = oauth_retry(&err, claim_username).ok_or(err)?;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Three-way OAuth resolution inside a single transaction
    async fn resolve_oauth(
        &self,
        profile: &OAuthProfile,
        email: &str,
        claim_username: bool,
    ) -> DbResult<DbUser> {
        let mut tx = self.pool.begin().await?;

        // 1. Already linked
        let linked = sqlx::query_as::<_, DbUser>(&format!(
            r#"
            UPDATE users
            SET is_email_verified = TRUE, updated_at = NOW()
            WHERE oauth_provider = $1 AND oauth_id = $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&profile.provider)
        .bind(&profile.provider_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(user) = linked {
            tx.commit().await?;
            return Ok(user);
        }

        let username = if claim_username {
            available_username(&mut tx, &profile.username_candidate()).await?
        } else {
            None
        };

        // 2. Existing account with the same email: link it
        let by_email = sqlx::query_as::<_, DbUser>(&format!(
            r#"
            UPDATE users
            SET oauth_provider = $2,
                oauth_id = $3,
                is_email_verified = TRUE,
                profile_picture_url = COALESCE($4, profile_picture_url),
                username = COALESCE(username, $5),
                updated_at = NOW()
            WHERE email = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(&profile.provider)
        .bind(&profile.provider_id)
        .bind(profile.picture_url.as_deref())
        .bind(username.as_deref())
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::from_write)?;

        let user = match by_email {
            Some(user) => user,
            // 3. Brand new account
            None => sqlx::query_as::<_, DbUser>(&format!(
                r#"
                INSERT INTO users
                    (email, oauth_provider, oauth_id, is_email_verified, profile_picture_url, username)
                VALUES ($1, $2, $3, TRUE, $4, $5)
                RETURNING {USER_COLUMNS}
                "#
            ))
            .bind(email)
            .bind(&profile.provider)
            .bind(&profile.provider_id)
            .bind(profile.picture_url.as_deref())
            .bind(username.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(DbError::from_write)?,
        };

        tx.commit().await?;
        Ok(user)
    }

    /// Replace the credential
    pub async fn set_credential(&self, user_id: i64, password_hash: &str) -> DbResult<Option<DbUser>> {
        let user = sqlx::query_as::<_, DbUser>(&format!(
            r#"
            UPDATE users SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Patch profile fields, keeping stored values for absent ones
    pub async fn update_profile(&self, user_id: i64, patch: &ProfilePatch) -> DbResult<Option<DbUser>> {
        let user = sqlx::query_as::<_, DbUser>(&format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                profile_picture_url = COALESCE($3, profile_picture_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(patch.username.as_deref())
        .bind(patch.profile_picture_url.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from_write)?;

        Ok(user)
    }

    /// Update role
    pub async fn set_role(&self, user_id: i64, role: &str) -> DbResult<Option<DbUser>> {
        let user = sqlx::query_as::<_, DbUser>(&format!(
            r#"
            UPDATE users SET role = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}

/// `Some(candidate)` when no other row holds that username
async fn available_username(
    tx: &mut Transaction<'_, Postgres>,
    candidate: &str,
) -> DbResult<Option<String>> {
    if candidate.is_empty() {
        return Ok(None);
    }

    let taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
        .bind(candidate)
        .fetch_one(&mut **tx)
        .await?;

    Ok((!taken).then(|| candidate.to_string()))
}

/// Whether a failed OAuth resolution is worth retrying, and if so whether
/// the retry should still try to claim the derived username
fn oauth_retry(err: &DbError, claim_username: bool) -> Option<bool> {
    match err {
        DbError::Duplicate(DuplicateField::Username) => Some(false),
        DbError::Duplicate(DuplicateField::Email | DuplicateField::OAuthIdentity) => {
            Some(claim_username)
        }
        _ => None,
    }
}
