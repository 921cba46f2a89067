//! In-process implementations of the credential store and session registry.
//!
//! They mirror the Postgres semantics, including the partial uniqueness
//! rules, and back the test suite and local runs without a database. Users
//! and sessions live in one table set behind one lock, so withdrawal and
//! session creation cannot interleave.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::auth::credentials::{CredentialStore, generate_user_id};
use crate::auth::sessions::{SessionRegistry, hash_token};
use crate::auth::{AuthError, AuthResult};
use crate::models::{Session, User};

struct SessionRow {
    session: Session,
    token_hash: String,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    sessions: Vec<SessionRow>,
}

type SharedTables = Arc<Mutex<Tables>>;

#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    tables: SharedTables,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry over the same tables as this store.
    pub fn session_registry(&self) -> MemorySessionRegistry {
        MemorySessionRegistry {
            tables: self.tables.clone(),
        }
    }
}

#[rocket::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let tables = self.tables.lock();
        let users = &tables.users;
        Ok(users
            .iter()
            .find(|user| user.is_active() && user.email == email)
            .cloned())
    }

    async fn find_by_nickname(&self, nickname: &str) -> AuthResult<Option<User>> {
        let tables = self.tables.lock();
        let users = &tables.users;
        Ok(users
            .iter()
            .find(|user| user.is_active() && user.nickname == nickname)
            .cloned())
    }

    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<User>> {
        let tables = self.tables.lock();
        let users = &tables.users;
        Ok(users.iter().find(|user| user.id == user_id).cloned())
    }

    async fn find_by_name_and_email(
        &self,
        name: &str,
        email: &str,
    ) -> AuthResult<Option<User>> {
        let tables = self.tables.lock();
        let users = &tables.users;
        Ok(users
            .iter()
            .find(|user| user.is_active() && user.name == name && user.email == email)
            .cloned())
    }

    async fn create(
        &self,
        name: &str,
        nickname: &str,
        email: &str,
        password_hash: &str,
    ) -> AuthResult<User> {
        let mut tables = self.tables.lock();
        let users = &mut tables.users;
        if users.iter().any(|user| user.is_active() && user.email == email) {
            return Err(AuthError::conflict("Email is already registered"));
        }
        if users
            .iter()
            .any(|user| user.is_active() && user.nickname == nickname)
        {
            return Err(AuthError::conflict("Nickname is already taken"));
        }

        let now = Utc::now();
        let user = User {
            id: generate_user_id(),
            name: name.to_string(),
            nickname: nickname.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        user_id: &str,
        nickname: &str,
        password_hash: Option<&str>,
    ) -> AuthResult<Option<User>> {
        let mut tables = self.tables.lock();
        let users = &mut tables.users;
        if users
            .iter()
            .any(|user| user.is_active() && user.id != user_id && user.nickname == nickname)
        {
            return Err(AuthError::conflict("Nickname is already taken"));
        }

        let Some(user) = users
            .iter_mut()
            .find(|user| user.is_active() && user.id == user_id)
        else {
            return Ok(None);
        };

        user.nickname = nickname.to_string();
        if let Some(hash) = password_hash {
            user.password_hash = hash.to_string();
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn withdraw(&self, user_id: &str) -> AuthResult<Option<u64>> {
        let mut tables = self.tables.lock();
        let now = Utc::now();
        let Some(user) = tables
            .users
            .iter_mut()
            .find(|user| user.is_active() && user.id == user_id)
        else {
            return Ok(None);
        };
        user.deleted_at = Some(now);

        let mut revoked = 0;
        for row in tables
            .sessions
            .iter_mut()
            .filter(|row| row.session.is_live() && row.session.user_id == user_id)
        {
            row.session.deleted_at = Some(now);
            revoked += 1;
        }
        Ok(Some(revoked))
    }

    async fn reset_password(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> AuthResult<bool> {
        let mut tables = self.tables.lock();
        let users = &mut tables.users;
        let mut updated = false;
        for user in users
            .iter_mut()
            .filter(|user| user.is_active() && user.name == name && user.email == email)
        {
            user.password_hash = password_hash.to_string();
            updated = true;
        }
        Ok(updated)
    }
}

pub struct MemorySessionRegistry {
    tables: SharedTables,
}

impl MemorySessionRegistry {
    /// Count of live sessions for `user_id`; used by tests to assert the
    /// single-session rule.
    pub fn live_count(&self, user_id: &str) -> usize {
        self.tables
            .lock()
            .sessions
            .iter()
            .filter(|row| row.session.is_live() && row.session.user_id == user_id)
            .count()
    }
}

#[rocket::async_trait]
impl SessionRegistry for MemorySessionRegistry {
    async fn create(
        &self,
        user_id: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<Session> {
        let mut tables = self.tables.lock();
        if !tables
            .users
            .iter()
            .any(|user| user.is_active() && user.id == user_id)
        {
            return Err(AuthError::not_found("User not found"));
        }

        let rows = &mut tables.sessions;
        if rows
            .iter()
            .any(|row| row.session.is_live() && row.session.user_id == user_id)
        {
            return Err(AuthError::conflict("Already logged in"));
        }

        let session = Session {
            id: rows.len() as i64 + 1,
            user_id: user_id.to_string(),
            issued_at: Utc::now(),
            expires_at,
            accesstoken_updated_at: None,
            deleted_at: None,
        };
        rows.push(SessionRow {
            session: session.clone(),
            token_hash: hash_token(refresh_token),
        });
        Ok(session)
    }

    async fn find_by_token(&self, refresh_token: &str) -> AuthResult<Option<Session>> {
        let digest = hash_token(refresh_token);
        let tables = self.tables.lock();
        let rows = &tables.sessions;
        Ok(rows
            .iter()
            .find(|row| row.session.is_live() && row.token_hash == digest)
            .map(|row| row.session.clone()))
    }

    async fn find_by_user(&self, user_id: &str) -> AuthResult<Option<Session>> {
        let tables = self.tables.lock();
        let rows = &tables.sessions;
        Ok(rows
            .iter()
            .find(|row| row.session.is_live() && row.session.user_id == user_id)
            .map(|row| row.session.clone()))
    }

    async fn touch_access_issued(&self, refresh_token: &str) -> AuthResult<bool> {
        let digest = hash_token(refresh_token);
        let mut tables = self.tables.lock();
        let rows = &mut tables.sessions;
        match rows
            .iter_mut()
            .find(|row| row.session.is_live() && row.token_hash == digest)
        {
            Some(row) => {
                row.session.accesstoken_updated_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn rotate(
        &self,
        user_id: &str,
        current_token: &str,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let current = hash_token(current_token);
        let mut tables = self.tables.lock();
        let rows = &mut tables.sessions;
        match rows.iter_mut().find(|row| {
            row.session.is_live() && row.session.user_id == user_id && row.token_hash == current
        }) {
            Some(row) => {
                row.token_hash = hash_token(new_token);
                row.session.issued_at = Utc::now();
                row.session.expires_at = expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke(&self, refresh_token: &str) -> AuthResult<u64> {
        let digest = hash_token(refresh_token);
        let now = Utc::now();
        let mut tables = self.tables.lock();
        let rows = &mut tables.sessions;
        let mut revoked = 0;
        for row in rows
            .iter_mut()
            .filter(|row| row.session.is_live() && row.token_hash == digest)
        {
            row.session.deleted_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn revoke_by_user(&self, user_id: &str) -> AuthResult<u64> {
        let now = Utc::now();
        let mut tables = self.tables.lock();
        let rows = &mut tables.sessions;
        let mut revoked = 0;
        for row in rows
            .iter_mut()
            .filter(|row| row.session.is_live() && row.session.user_id == user_id)
        {
            row.session.deleted_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }
}
