//! Profile read, update and withdrawal for an already authenticated user.

use std::sync::Arc;

use crate::auth::credentials::CredentialStore;
use crate::auth::passwords::PasswordService;
use crate::auth::sessions::SessionRegistry;
use crate::auth::validation::{validate_nickname, validate_password_pair};
use crate::auth::{AuthError, AuthResult};
use crate::models::User;

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate<'a> {
    pub nickname: &'a str,
    pub current_password: &'a str,
    pub new_password: Option<&'a str>,
    pub confirm_new_password: Option<&'a str>,
}

#[derive(Clone)]
pub struct AccountService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionRegistry>,
    passwords: Arc<PasswordService>,
}

impl AccountService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionRegistry>,
        passwords: Arc<PasswordService>,
    ) -> Self {
        Self {
            credentials,
            sessions,
            passwords,
        }
    }

    async fn active_user(&self, user_id: &str) -> AuthResult<User> {
        self.credentials
            .find_by_id(user_id)
            .await?
            .filter(User::is_active)
            .ok_or_else(|| AuthError::not_found("User not found"))
    }

    pub async fn get_profile(&self, user_id: &str) -> AuthResult<User> {
        self.active_user(user_id).await
    }

    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate<'_>) -> AuthResult<User> {
        let user = self.active_user(user_id).await?;

        validate_nickname(update.nickname)?;
        if update.new_password.is_none()
            && update.confirm_new_password.is_some_and(|value| !value.is_empty())
        {
            return Err(AuthError::invalid_input("newPassword is required"));
        }
        if update.nickname != user.nickname
            && self
                .credentials
                .find_by_nickname(update.nickname)
                .await?
                .is_some_and(|other| other.id != user.id)
        {
            return Err(AuthError::conflict("Nickname is already taken"));
        }

        if !self
            .passwords
            .verify(update.current_password, &user.password_hash)
            .await?
        {
            return Err(AuthError::unauthorized("Incorrect password"));
        }

        let password_hash = match update.new_password {
            Some(new_password) => {
                let confirmation = update.confirm_new_password.unwrap_or_default();
                validate_password_pair(new_password, confirmation)?;
                if new_password == update.current_password {
                    return Err(AuthError::invalid_input(
                        "New password must differ from the current password",
                    ));
                }
                Some(self.passwords.hash(new_password).await?)
            }
            None => None,
        };

        let updated = self
            .credentials
            .update_profile(&user.id, update.nickname, password_hash.as_deref())
            .await?
            .ok_or_else(|| AuthError::not_found("User not found"))?;

        log::info!(
            "user {} updated profile (password changed: {})",
            updated.id,
            password_hash.is_some()
        );
        Ok(updated)
    }

    /// Soft-deletes the account and revokes its live session in one store
    /// operation, so a login racing the withdrawal cannot leave a session
    /// behind on the deleted account.
    pub async fn withdraw(&self, user_id: &str, password: &str) -> AuthResult<()> {
        let user = self.active_user(user_id).await?;

        if !self.passwords.verify(password, &user.password_hash).await? {
            return Err(AuthError::unauthorized("Incorrect password"));
        }

        let revoked = self
            .credentials
            .withdraw(&user.id)
            .await?
            .ok_or_else(|| AuthError::not_found("User not found"))?;

        log::info!("user {} withdrew ({} session(s) revoked)", user.id, revoked);
        Ok(())
    }

    /// Token-based revocation; the caller's identity plays no part.
    pub async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        if self.sessions.revoke(refresh_token).await? == 0 {
            return Err(AuthError::unauthorized("Invalid refresh token"));
        }
        Ok(())
    }
}
