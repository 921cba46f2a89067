//! Authentication module: configuration, credential and session stores,
//! password hashing, token minting, services, request guards and the
//! `/users` route handlers.

use std::sync::Arc;

pub mod account;
pub mod config;
pub mod credentials;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod memory;
pub mod notifier;
pub mod passwords;
pub mod responses;
pub mod routes;
pub mod service;
pub mod sessions;
pub mod validation;

pub use account::AccountService;
pub use config::AuthConfig;
pub use credentials::{CredentialStore, PgCredentialStore};
pub use error::{AuthError, AuthResult};
pub use guards::AuthUser;
pub use jwt::JwtService;
pub use notifier::NotificationSender;
pub use passwords::PasswordService;
pub use service::AuthService;
pub use sessions::{PgSessionRegistry, SessionRegistry};

/// Everything the auth routes need, managed as Rocket state.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_service: Arc<JwtService>,
    pub auth: AuthService,
    pub accounts: AccountService,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionRegistry>,
        notifier: Arc<dyn NotificationSender>,
    ) -> AuthResult<Self> {
        let password_service = Arc::new(PasswordService::new()?);
        let jwt_service = Arc::new(JwtService::from_config(&config)?);

        let auth = AuthService::new(
            credentials.clone(),
            sessions.clone(),
            password_service.clone(),
            jwt_service.clone(),
            notifier,
            config.temp_password_len,
        );
        let accounts = AccountService::new(credentials, sessions, password_service);

        Ok(Self {
            jwt_service,
            auth,
            accounts,
        })
    }
}
