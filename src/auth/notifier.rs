//! Outbound delivery of temporary passwords.
//!
//! [`SmtpNotificationSender`] wraps the `lettre` async SMTP transport.
//! Configuration is read from the environment; when `SMTP_HOST` is absent
//! [`NotifierConfig::from_env`] returns `None` and the server installs
//! [`DisabledNotificationSender`], which refuses every dispatch so that the
//! recovery flow never persists a password nobody received.

use crate::auth::{AuthError, AuthResult};

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@oasis.local";

#[rocket::async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_temporary_password(
        &self,
        name: &str,
        email: &str,
        temporary_password: &str,
    ) -> AuthResult<()>;
}

/// SMTP settings for outbound mail.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl NotifierConfig {
    /// | Variable        | Required | Default               |
    /// |-----------------|----------|-----------------------|
    /// | `SMTP_HOST`     | yes      | -                     |
    /// | `SMTP_PORT`     | no       | `587`                 |
    /// | `SMTP_FROM`     | no       | `noreply@oasis.local` |
    /// | `SMTP_USER`     | no       | -                     |
    /// | `SMTP_PASSWORD` | no       | -                     |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

pub fn temporary_password_message(name: &str, temporary_password: &str) -> (String, String) {
    let subject = "City Oasis - temporary password".to_string();
    let body = format!(
        "Hello {name},\n\nYour temporary password is {temporary_password}\n\
         Please sign in and change it from your profile page."
    );
    (subject, body)
}

pub struct SmtpNotificationSender {
    config: NotifierConfig,
}

impl SmtpNotificationSender {
    pub fn new(config: NotifierConfig) -> Self {
        Self { config }
    }
}

#[rocket::async_trait]
impl NotificationSender for SmtpNotificationSender {
    async fn send_temporary_password(
        &self,
        name: &str,
        email: &str,
        temporary_password: &str,
    ) -> AuthResult<()> {
        use lettre::{
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
            message::header::ContentType, transport::smtp::authentication::Credentials,
        };

        let (subject, body) = temporary_password_message(name, temporary_password);

        let from = self
            .config
            .from_address
            .parse()
            .map_err(|e: lettre::address::AddressError| AuthError::Notification(e.to_string()))?;
        let to = email
            .parse()
            .map_err(|e: lettre::address::AddressError| AuthError::Notification(e.to_string()))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AuthError::Notification(e.to_string()))?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AuthError::Notification(e.to_string()))?
                .port(self.config.smtp_port);

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        transport_builder
            .build()
            .send(message)
            .await
            .map_err(|e| AuthError::Notification(e.to_string()))?;

        log::info!("temporary password email sent to {}", email);
        Ok(())
    }
}

/// Installed when SMTP is not configured.
pub struct DisabledNotificationSender;

#[rocket::async_trait]
impl NotificationSender for DisabledNotificationSender {
    async fn send_temporary_password(
        &self,
        _name: &str,
        email: &str,
        _temporary_password: &str,
    ) -> AuthResult<()> {
        log::warn!(
            "email delivery is not configured; dropping temporary password for {}",
            email
        );
        Err(AuthError::Notification(
            "email delivery is not configured".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_contains_name_and_secret() {
        let (subject, body) = temporary_password_message("Kim", "Xy12ab34Cd");
        assert!(subject.contains("temporary password"));
        assert!(body.contains("Kim"));
        assert!(body.contains("Xy12ab34Cd"));
    }

    #[tokio::test]
    async fn disabled_sender_refuses_dispatch() {
        let result = DisabledNotificationSender
            .send_temporary_password("Kim", "a@b.com", "Xy12ab34Cd")
            .await;
        assert!(matches!(result, Err(AuthError::Notification(_))));
    }
}
