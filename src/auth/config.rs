use crate::auth::{AuthError, AuthResult};

/// Authentication configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub access_token_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_secret: String,
    pub refresh_token_ttl_secs: i64,
    pub leeway_secs: u64,
    pub temp_password_len: usize,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let issuer = std::env::var("OASIS_JWT_ISSUER").unwrap_or_else(|_| "oasis-api".into());
        let access_token_secret = std::env::var("OASIS_ACCESS_TOKEN_SECRET")
            .map_err(|_| AuthError::Config("OASIS_ACCESS_TOKEN_SECRET is required".into()))?;
        let access_token_ttl_secs = std::env::var("OASIS_ACCESS_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(15 * 60);
        let refresh_token_secret = std::env::var("OASIS_REFRESH_TOKEN_SECRET")
            .map_err(|_| AuthError::Config("OASIS_REFRESH_TOKEN_SECRET is required".into()))?;
        let refresh_token_ttl_secs = std::env::var("OASIS_REFRESH_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(14 * 24 * 60 * 60);
        let leeway_secs = std::env::var("OASIS_JWT_LEEWAY_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);
        let temp_password_len = std::env::var("OASIS_TEMP_PASSWORD_LEN")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(10);

        let config = Self {
            issuer,
            access_token_secret,
            access_token_ttl_secs,
            refresh_token_secret,
            refresh_token_ttl_secs,
            leeway_secs,
            temp_password_len,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would let one token class forge the other.
    pub fn validate(&self) -> AuthResult<()> {
        if self.access_token_secret.is_empty() || self.refresh_token_secret.is_empty() {
            return Err(AuthError::Config("token secrets must not be empty".into()));
        }
        if self.access_token_secret == self.refresh_token_secret {
            return Err(AuthError::Config(
                "access and refresh token secrets must differ".into(),
            ));
        }
        if self.access_token_ttl_secs <= 0 || self.refresh_token_ttl_secs <= 0 {
            return Err(AuthError::Config("token lifetimes must be positive".into()));
        }
        if self.temp_password_len < 8 {
            return Err(AuthError::Config(
                "temporary passwords must be at least 8 characters".into(),
            ));
        }
        Ok(())
    }
}
