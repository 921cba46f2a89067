use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::auth::{AuthConfig, AuthError, AuthResult};

/// Claims carried by short-lived access tokens.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

/// Refresh tokens carry no identity; the session registry maps them to a user.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RefreshTokenClaims {
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(ttl_secs),
        }
    }
}

pub struct JwtService {
    access: TokenKeys,
    refresh: TokenKeys,
    validation: Validation,
    issuer: String,
}

impl JwtService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        config.validate()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.clone()]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.leeway = config.leeway_secs;

        Ok(Self {
            access: TokenKeys::new(&config.access_token_secret, config.access_token_ttl_secs),
            refresh: TokenKeys::new(&config.refresh_token_secret, config.refresh_token_ttl_secs),
            validation,
            issuer: config.issuer.clone(),
        })
    }

    pub fn issue_access_token(&self, user_id: &str) -> AuthResult<SignedToken> {
        let now = Utc::now();
        let expires_at = now + self.access.ttl;
        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.access.encoding)?;
        Ok(SignedToken { token, expires_at })
    }

    pub fn issue_refresh_token(&self) -> AuthResult<SignedToken> {
        let now = Utc::now();
        let expires_at = now + self.refresh.ttl;
        // jti keeps two refresh tokens minted in the same second distinct.
        let claims = RefreshTokenClaims {
            iss: self.issuer.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.refresh.encoding)?;
        Ok(SignedToken { token, expires_at })
    }

    /// Checks signature, shape and expiry only; session state is the caller's concern.
    pub fn verify_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        self.verify(token, &self.access.decoding)
    }

    pub fn verify_refresh_token(&self, token: &str) -> AuthResult<RefreshTokenClaims> {
        self.verify(token, &self.refresh.decoding)
    }

    fn verify<C: DeserializeOwned>(&self, token: &str, key: &DecodingKey) -> AuthResult<C> {
        decode::<C>(token, key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                log::debug!("token rejected: {}", err);
                AuthError::TokenInvalid
            })
    }
}
