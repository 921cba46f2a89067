//! Session registry: the live refresh-token session of each user.
//!
//! Tokens are never stored; rows carry a SHA-512 digest and lookups hash
//! the presented value first. The `sessions_one_live_per_user_idx` partial
//! index guarantees at most one row with `deleted_at IS NULL` per user, so
//! two racing logins cannot both insert.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, PgPool};
use sha2::{Digest, Sha512};

use crate::auth::{AuthError, AuthResult};
use crate::models::Session;

const SESSION_COLUMNS: &str =
    "id, user_id, issued_at, expires_at, accesstoken_updated_at, deleted_at";

#[rocket::async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Inserts a live session. Fails with [`AuthError::NotFound`] unless the
    /// user is active, and with [`AuthError::Conflict`] if it already holds one.
    async fn create(
        &self,
        user_id: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<Session>;

    async fn find_by_token(&self, refresh_token: &str) -> AuthResult<Option<Session>>;

    async fn find_by_user(&self, user_id: &str) -> AuthResult<Option<Session>>;

    /// Stamps `accesstoken_updated_at` without touching expiry.
    async fn touch_access_issued(&self, refresh_token: &str) -> AuthResult<bool>;

    /// Swaps the live session's token in place, but only while it still holds
    /// `current_token`. Returns `false` if another rotation won.
    async fn rotate(
        &self,
        user_id: &str,
        current_token: &str,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<bool>;

    /// Idempotent; revoking an unknown or revoked token is not an error.
    async fn revoke(&self, refresh_token: &str) -> AuthResult<u64>;

    async fn revoke_by_user(&self, user_id: &str) -> AuthResult<u64>;
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(token.as_bytes());
    STANDARD_NO_PAD.encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct PgSessionRegistry {
    pool: PgPool,
}

impl PgSessionRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl SessionRegistry for PgSessionRegistry {
    async fn create(
        &self,
        user_id: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<Session> {
        // FOR SHARE waits on a withdrawal in progress and re-reads the row, so
        // a session is never attached to an account deleted meanwhile.
        let sql = format!(
            r#"
            INSERT INTO sessions (user_id, token_hash, issued_at, expires_at)
            SELECT id, $2, $3, $4
            FROM users
            WHERE id = $1
              AND deleted_at IS NULL
            FOR SHARE
            RETURNING {SESSION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Session>(&sql)
            .bind(user_id)
            .bind(hash_token(refresh_token))
            .bind(Utc::now())
            .bind(expires_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    AuthError::conflict("Already logged in")
                } else {
                    AuthError::from(err)
                }
            })?
            .ok_or_else(|| AuthError::not_found("User not found"))
    }

    async fn find_by_token(&self, refresh_token: &str) -> AuthResult<Option<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE token_hash = $1 AND deleted_at IS NULL"
        );
        let session = sqlx::query_as::<_, Session>(&sql)
            .bind(hash_token(refresh_token))
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn find_by_user(&self, user_id: &str) -> AuthResult<Option<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = $1 AND deleted_at IS NULL"
        );
        let session = sqlx::query_as::<_, Session>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn touch_access_issued(&self, refresh_token: &str) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET accesstoken_updated_at = $1 WHERE token_hash = $2 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(hash_token(refresh_token))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn rotate(
        &self,
        user_id: &str,
        current_token: &str,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET token_hash = $3,
                issued_at = $4,
                expires_at = $5
            WHERE user_id = $1
              AND token_hash = $2
              AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(hash_token(current_token))
        .bind(hash_token(new_token))
        .bind(Utc::now())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke(&self, refresh_token: &str) -> AuthResult<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET deleted_at = $1 WHERE token_hash = $2 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(hash_token(refresh_token))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn revoke_by_user(&self, user_id: &str) -> AuthResult<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET deleted_at = $1 WHERE user_id = $2 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if db_err.code().map(|code| code == "23505").unwrap_or(false)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_digest_is_stable_and_opaque() {
        let token = "header.payload.signature";
        assert_eq!(hash_token(token), hash_token(token));
        assert_ne!(hash_token(token), hash_token("header.payload.other"));
        assert!(!hash_token(token).contains(token));
    }
}
