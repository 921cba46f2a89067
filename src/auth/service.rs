//! Signup, login, token refresh, logout and password recovery.
//!
//! Identity lifecycle: anonymous -> registered (signup) -> authenticated
//! (login creates the single live session) -> registered again on logout,
//! withdrawal or revocation. Refresh keeps the authenticated state alive by
//! rotating the session's refresh token.

use std::sync::Arc;

use chrono::Utc;

use crate::auth::credentials::CredentialStore;
use crate::auth::jwt::{JwtService, SignedToken};
use crate::auth::notifier::NotificationSender;
use crate::auth::passwords::{PasswordService, generate_temporary_password};
use crate::auth::sessions::SessionRegistry;
use crate::auth::validation::{
    validate_email, validate_name, validate_nickname, validate_password_pair,
};
use crate::auth::{AuthError, AuthResult};
use crate::models::User;

/// Token pair handed back by login and refresh.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: SignedToken,
    pub refresh_token: SignedToken,
}

#[derive(Debug, Clone)]
pub struct SignUpInput<'a> {
    pub name: &'a str,
    pub nickname: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub confirm_password: &'a str,
}

#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionRegistry>,
    passwords: Arc<PasswordService>,
    jwt: Arc<JwtService>,
    notifier: Arc<dyn NotificationSender>,
    temp_password_len: usize,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionRegistry>,
        passwords: Arc<PasswordService>,
        jwt: Arc<JwtService>,
        notifier: Arc<dyn NotificationSender>,
        temp_password_len: usize,
    ) -> Self {
        Self {
            credentials,
            sessions,
            passwords,
            jwt,
            notifier,
            temp_password_len,
        }
    }

    pub async fn sign_up(&self, input: SignUpInput<'_>) -> AuthResult<User> {
        validate_name(input.name)?;
        validate_nickname(input.nickname)?;
        validate_email(input.email)?;
        validate_password_pair(input.password, input.confirm_password)?;

        if self.credentials.find_by_nickname(input.nickname).await?.is_some() {
            return Err(AuthError::conflict("Nickname is already taken"));
        }
        if self.credentials.find_by_email(input.email).await?.is_some() {
            return Err(AuthError::conflict("Email is already registered"));
        }

        let password_hash = self.passwords.hash(input.password).await?;
        let user = self
            .credentials
            .create(input.name, input.nickname, input.email, &password_hash)
            .await?;

        log::info!("user {} signed up", user.id);
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthResult<IssuedTokens> {
        validate_email(email)?;

        let user = self
            .credentials
            .find_by_email(email)
            .await?
            .ok_or_else(|| AuthError::not_found("Email is not registered"))?;

        if !self.passwords.verify(password, &user.password_hash).await? {
            log::debug!("login rejected for user {}: wrong password", user.id);
            return Err(AuthError::unauthorized("Incorrect password"));
        }

        let now = Utc::now();
        if let Some(existing) = self.sessions.find_by_user(&user.id).await? {
            if !existing.is_expired_at(now) {
                log::debug!("login rejected for user {}: session already live", user.id);
                return Err(AuthError::conflict("Already logged in"));
            }
            // An expired session can never be refreshed; retire it so it
            // does not lock the account out.
            self.sessions.revoke_by_user(&user.id).await?;
            log::info!("revoked expired session for user {}", user.id);
        }

        let access_token = self.jwt.issue_access_token(&user.id)?;
        let refresh_token = self.jwt.issue_refresh_token()?;
        self.sessions
            .create(&user.id, &refresh_token.token, refresh_token.expires_at)
            .await?;

        log::info!("user {} logged in", user.id);
        Ok(IssuedTokens {
            access_token,
            refresh_token,
        })
    }

    /// Exchanges a live refresh token for a new access token and a rotated
    /// refresh token. The presented token is single use.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> AuthResult<IssuedTokens> {
        let session = self
            .sessions
            .find_by_token(refresh_token)
            .await?
            .ok_or_else(|| AuthError::unauthorized("Invalid refresh token"))?;

        if self.jwt.verify_refresh_token(refresh_token).is_err()
            || session.is_expired_at(Utc::now())
        {
            self.sessions.revoke(refresh_token).await?;
            log::info!("expired session of user {} revoked on refresh", session.user_id);
            return Err(AuthError::unauthorized("Invalid refresh token"));
        }

        let user = self
            .credentials
            .find_by_id(&session.user_id)
            .await?
            .filter(User::is_active)
            .ok_or_else(|| AuthError::not_found("User not found"))?;

        let access_token = self.jwt.issue_access_token(&user.id)?;
        let rotated = self.jwt.issue_refresh_token()?;
        let swapped = self
            .sessions
            .rotate(&user.id, refresh_token, &rotated.token, rotated.expires_at)
            .await?;
        if !swapped {
            return Err(AuthError::unauthorized("Invalid refresh token"));
        }
        self.sessions.touch_access_issued(&rotated.token).await?;

        log::info!("reissued tokens for user {}", user.id);
        Ok(IssuedTokens {
            access_token,
            refresh_token: rotated,
        })
    }

    pub async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        let session = self
            .sessions
            .find_by_token(refresh_token)
            .await?
            .ok_or_else(|| AuthError::unauthorized("Invalid refresh token"))?;

        self.sessions.revoke(refresh_token).await?;
        log::info!("user {} logged out", session.user_id);
        Ok(())
    }

    /// Mails a fresh temporary password. Delivery happens before the new hash
    /// is stored, so a failed send leaves the old password working.
    pub async fn find_password(&self, name: &str, email: &str) -> AuthResult<()> {
        validate_name(name)?;
        validate_email(email)?;

        let user = self
            .credentials
            .find_by_name_and_email(name, email)
            .await?
            .ok_or_else(|| AuthError::not_found("No account matches that name and email"))?;

        let temporary_password = generate_temporary_password(self.temp_password_len);
        let password_hash = self.passwords.hash(&temporary_password).await?;

        self.notifier
            .send_temporary_password(name, email, &temporary_password)
            .await?;

        if !self
            .credentials
            .reset_password(name, email, &password_hash)
            .await?
        {
            return Err(AuthError::not_found("No account matches that name and email"));
        }

        log::info!("temporary password issued for user {}", user.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::RefreshTokenClaims;
    use crate::auth::memory::{MemoryCredentialStore, MemorySessionRegistry};
    use crate::test_support::{CapturingNotifier, test_auth_config};
    use chrono::Duration;
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

    struct Harness {
        service: AuthService,
        credentials: Arc<MemoryCredentialStore>,
        sessions: Arc<MemorySessionRegistry>,
        notifier: Arc<CapturingNotifier>,
        jwt: Arc<JwtService>,
        passwords: Arc<PasswordService>,
    }

    fn harness() -> Harness {
        let credentials = Arc::new(MemoryCredentialStore::new());
        let sessions = Arc::new(credentials.session_registry());
        let notifier = Arc::new(CapturingNotifier::default());
        let jwt = Arc::new(JwtService::from_config(&test_auth_config()).expect("jwt"));
        let passwords = Arc::new(PasswordService::new().expect("passwords"));
        let service = AuthService::new(
            credentials.clone(),
            sessions.clone(),
            passwords.clone(),
            jwt.clone(),
            notifier.clone(),
            10,
        );
        Harness {
            service,
            credentials,
            sessions,
            notifier,
            jwt,
            passwords,
        }
    }

    fn kim() -> SignUpInput<'static> {
        SignUpInput {
            name: "Kim",
            nickname: "kim01",
            email: "a@b.com",
            password: "abc12345",
            confirm_password: "abc12345",
        }
    }

    #[tokio::test]
    async fn signup_stores_only_a_hash() {
        let h = harness();
        let user = h.service.sign_up(kim()).await.expect("signup");

        assert_ne!(user.password_hash, "abc12345");
        assert!(h.passwords.verify("abc12345", &user.password_hash).await.unwrap());
        assert!(!h.passwords.verify("abc12346", &user.password_hash).await.unwrap());
    }

    #[tokio::test]
    async fn signup_validation_short_circuits_before_store() {
        let h = harness();
        let mut input = kim();
        input.name = "K";
        input.password = "short";
        let err = h.service.sign_up(input).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid name format");

        let mut input = kim();
        input.confirm_password = "abc123456";
        assert!(matches!(
            h.service.sign_up(input).await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(h.credentials.find_by_email("a@b.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts_until_withdrawn() {
        let h = harness();
        let user = h.service.sign_up(kim()).await.expect("signup");

        let mut same_email = kim();
        same_email.nickname = "other1";
        assert!(matches!(
            h.service.sign_up(same_email.clone()).await,
            Err(AuthError::Conflict(_))
        ));

        let mut same_nickname = kim();
        same_nickname.email = "other@b.com";
        assert!(matches!(
            h.service.sign_up(same_nickname).await,
            Err(AuthError::Conflict(_))
        ));

        h.credentials.withdraw(&user.id).await.unwrap();
        h.service
            .sign_up(same_email)
            .await
            .expect("former email is reusable");
    }

    #[tokio::test]
    async fn login_failure_kinds() {
        let h = harness();
        h.service.sign_up(kim()).await.expect("signup");

        assert!(matches!(
            h.service.login("not-an-email", "abc12345").await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            h.service.login("nobody@b.com", "abc12345").await,
            Err(AuthError::NotFound(_))
        ));
        assert!(matches!(
            h.service.login("a@b.com", "wrong1234").await,
            Err(AuthError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn single_active_session() {
        let h = harness();
        let user = h.service.sign_up(kim()).await.expect("signup");

        let tokens = h.service.login("a@b.com", "abc12345").await.expect("login");
        assert_eq!(h.sessions.live_count(&user.id), 1);
        let claims = h
            .jwt
            .verify_access_token(&tokens.access_token.token)
            .expect("valid access token");
        assert_eq!(claims.sub, user.id);

        assert!(matches!(
            h.service.login("a@b.com", "abc12345").await,
            Err(AuthError::Conflict(_))
        ));
        assert_eq!(h.sessions.live_count(&user.id), 1);

        h.service
            .logout(&tokens.refresh_token.token)
            .await
            .expect("logout");
        h.service
            .login("a@b.com", "abc12345")
            .await
            .expect("login after logout");
        assert_eq!(h.sessions.live_count(&user.id), 1);
    }

    #[tokio::test]
    async fn expired_session_does_not_block_login() {
        let h = harness();
        let user = h.service.sign_up(kim()).await.expect("signup");
        h.sessions
            .create(&user.id, "stale-token", Utc::now() - Duration::minutes(1))
            .await
            .unwrap();

        h.service
            .login("a@b.com", "abc12345")
            .await
            .expect("stale session is replaced");
        assert_eq!(h.sessions.live_count(&user.id), 1);
        assert!(h.sessions.find_by_token("stale-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refresh_rotates_and_retires_old_token() {
        let h = harness();
        let user = h.service.sign_up(kim()).await.expect("signup");
        let tokens = h.service.login("a@b.com", "abc12345").await.expect("login");

        let refreshed = h
            .service
            .refresh_access_token(&tokens.refresh_token.token)
            .await
            .expect("refresh");
        let claims = h
            .jwt
            .verify_access_token(&refreshed.access_token.token)
            .expect("valid access token");
        assert_eq!(claims.sub, user.id);
        assert_ne!(refreshed.refresh_token.token, tokens.refresh_token.token);

        assert!(matches!(
            h.service
                .refresh_access_token(&tokens.refresh_token.token)
                .await,
            Err(AuthError::Unauthorized(_))
        ));

        let session = h
            .sessions
            .find_by_token(&refreshed.refresh_token.token)
            .await
            .unwrap()
            .expect("rotated session is live");
        assert!(session.accesstoken_updated_at.is_some());
        assert_eq!(h.sessions.live_count(&user.id), 1);
    }

    #[tokio::test]
    async fn refresh_rejects_unknown_and_revoked_tokens() {
        let h = harness();
        h.service.sign_up(kim()).await.expect("signup");

        let unknown = h.jwt.issue_refresh_token().unwrap();
        assert!(matches!(
            h.service.refresh_access_token(&unknown.token).await,
            Err(AuthError::Unauthorized(_))
        ));

        let tokens = h.service.login("a@b.com", "abc12345").await.expect("login");
        h.service
            .logout(&tokens.refresh_token.token)
            .await
            .expect("logout");
        assert!(matches!(
            h.service
                .refresh_access_token(&tokens.refresh_token.token)
                .await,
            Err(AuthError::Unauthorized(_))
        ));
        assert!(matches!(
            h.service.logout(&tokens.refresh_token.token).await,
            Err(AuthError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn refresh_after_withdrawal_is_rejected() {
        let h = harness();
        let user = h.service.sign_up(kim()).await.expect("signup");
        let tokens = h.service.login("a@b.com", "abc12345").await.expect("login");
        h.credentials.withdraw(&user.id).await.unwrap();

        assert!(matches!(
            h.service
                .refresh_access_token(&tokens.refresh_token.token)
                .await,
            Err(AuthError::Unauthorized(_))
        ));
        assert!(matches!(
            h.service.login("a@b.com", "abc12345").await,
            Err(AuthError::NotFound(_))
        ));
    }

    fn expired_refresh_token() -> String {
        let config = test_auth_config();
        let now = Utc::now().timestamp();
        let claims = RefreshTokenClaims {
            iss: config.issuer.clone(),
            exp: now - 60,
            iat: now - 120,
            jti: "expired".into(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
        )
        .expect("encode")
    }

    #[tokio::test]
    async fn expired_refresh_token_revokes_its_session() {
        let h = harness();
        let user = h.service.sign_up(kim()).await.expect("signup");
        let token = expired_refresh_token();
        h.sessions
            .create(&user.id, &token, Utc::now() + Duration::days(1))
            .await
            .unwrap();

        assert!(matches!(
            h.service.refresh_access_token(&token).await,
            Err(AuthError::Unauthorized(_))
        ));
        assert!(h.sessions.find_by_token(&token).await.unwrap().is_none());
        assert_eq!(h.sessions.live_count(&user.id), 0);
    }

    #[tokio::test]
    async fn refresh_of_lapsed_session_revokes_it() {
        let h = harness();
        let user = h.service.sign_up(kim()).await.expect("signup");
        let token = h.jwt.issue_refresh_token().unwrap();
        h.sessions
            .create(&user.id, &token.token, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();

        assert!(matches!(
            h.service.refresh_access_token(&token.token).await,
            Err(AuthError::Unauthorized(_))
        ));
        assert!(h.sessions.find_by_token(&token.token).await.unwrap().is_none());
        h.service
            .login("a@b.com", "abc12345")
            .await
            .expect("login after revocation");
    }

    #[tokio::test]
    async fn find_password_mails_then_persists() {
        let h = harness();
        h.service.sign_up(kim()).await.expect("signup");

        assert!(matches!(
            h.service.find_password("Lee", "a@b.com").await,
            Err(AuthError::NotFound(_))
        ));
        assert!(matches!(
            h.service.find_password("Kim", "a@b").await,
            Err(AuthError::InvalidInput(_))
        ));

        h.service.find_password("Kim", "a@b.com").await.expect("recover");
        let sent = h.notifier.last_password_for("a@b.com").expect("mail sent");

        assert!(matches!(
            h.service.login("a@b.com", "abc12345").await,
            Err(AuthError::Unauthorized(_))
        ));
        h.service
            .login("a@b.com", &sent)
            .await
            .expect("temporary password works");
    }

    #[tokio::test]
    async fn failed_delivery_keeps_old_password() {
        let h = harness();
        h.service.sign_up(kim()).await.expect("signup");
        h.notifier.fail_next();

        assert!(matches!(
            h.service.find_password("Kim", "a@b.com").await,
            Err(AuthError::Notification(_))
        ));
        h.service
            .login("a@b.com", "abc12345")
            .await
            .expect("old password still valid");
    }
}
