//! Credential store: user identity records keyed by id, email and nickname.
//!
//! Lookups by email and nickname only see active rows, so a withdrawn
//! account never blocks reuse of its former address or nickname.
//! `find_by_id` returns soft-deleted rows too; callers inspect
//! [`User::is_active`].

use chrono::Utc;
use rocket_db_pools::sqlx::{self, PgPool};
use uuid::Uuid;

use crate::auth::{AuthError, AuthResult};
use crate::models::User;

const USER_COLUMNS: &str =
    "id, name, nickname, email, password_hash, created_at, updated_at, deleted_at";

#[rocket::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    async fn find_by_nickname(&self, nickname: &str) -> AuthResult<Option<User>>;

    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<User>>;

    /// Active account matching both name and email exactly.
    async fn find_by_name_and_email(&self, name: &str, email: &str)
    -> AuthResult<Option<User>>;

    /// Generates the id, inserts and returns the stored record. A lost
    /// uniqueness race surfaces as [`AuthError::Conflict`].
    async fn create(
        &self,
        name: &str,
        nickname: &str,
        email: &str,
        password_hash: &str,
    ) -> AuthResult<User>;

    /// Returns `None` when no active user has this id.
    async fn update_profile(
        &self,
        user_id: &str,
        nickname: &str,
        password_hash: Option<&str>,
    ) -> AuthResult<Option<User>>;

    /// Soft-deletes the active user and revokes every live session it holds
    /// as one unit. Returns the number of sessions revoked, or `None` when no
    /// active user has this id.
    async fn withdraw(&self, user_id: &str) -> AuthResult<Option<u64>>;

    /// Recovery path: the caller is not authenticated, so the row is matched
    /// on name and email rather than id.
    async fn reset_password(&self, name: &str, email: &str, password_hash: &str)
    -> AuthResult<bool>;
}

pub fn generate_user_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted_at IS NULL"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_nickname(&self, nickname: &str) -> AuthResult<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE nickname = $1 AND deleted_at IS NULL"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(nickname)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_name_and_email(
        &self,
        name: &str,
        email: &str,
    ) -> AuthResult<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE name = $1 AND email = $2 AND deleted_at IS NULL"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(name)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create(
        &self,
        name: &str,
        nickname: &str,
        email: &str,
        password_hash: &str,
    ) -> AuthResult<User> {
        let sql = format!(
            "INSERT INTO users (id, name, nickname, email, password_hash) VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(generate_user_id())
            .bind(name)
            .bind(nickname)
            .bind(email)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)
    }

    async fn update_profile(
        &self,
        user_id: &str,
        nickname: &str,
        password_hash: Option<&str>,
    ) -> AuthResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
            SET nickname = $2,
                password_hash = COALESCE($3, password_hash),
                updated_at = $4
            WHERE id = $1
              AND deleted_at IS NULL
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(nickname)
            .bind(password_hash)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_unique_violation)
    }

    async fn withdraw(&self, user_id: &str) -> AuthResult<Option<u64>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // The row lock taken here makes a concurrent session insert wait and
        // then see the account as deleted.
        let deleted = sqlx::query(
            "UPDATE users SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let revoked = sqlx::query(
            "UPDATE sessions SET deleted_at = $1 WHERE user_id = $2 AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(revoked.rows_affected()))
    }

    async fn reset_password(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $3 WHERE name = $1 AND email = $2 AND deleted_at IS NULL",
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn map_unique_violation(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return match db_err.constraint() {
                Some("users_email_live_idx") => AuthError::conflict("Email is already registered"),
                Some("users_nickname_live_idx") => AuthError::conflict("Nickname is already taken"),
                _ => AuthError::conflict("Account already exists"),
            };
        }
    }
    AuthError::from(err)
}
