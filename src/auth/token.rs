/// Signed token codec
///
/// Tokens are HS256 JWTs. Each purpose (access, refresh, activation, password
/// reset) signs with its own secret, so a token minted for one flow fails
/// signature verification in every other.
use crate::{
    admin::Role,
    config::AuthConfig,
    error::{AppError, AppResult},
};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Why a token was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
}

#[derive(Serialize)]
struct OutgoingEnvelope<'a, C> {
    #[serde(flatten)]
    claims: &'a C,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct IncomingEnvelope<C> {
    #[serde(flatten)]
    claims: C,
}

/// Sign `claims` with `secret`, expiring `ttl` seconds from now
pub fn issue<C: Serialize>(claims: &C, secret: &str, ttl: i64) -> AppResult<String> {
    let now = Utc::now().timestamp();
    let envelope = OutgoingEnvelope {
        claims,
        iat: now,
        exp: now + ttl,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &envelope,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
}

/// Check signature and expiry, then decode the claims
pub fn verify<C: DeserializeOwned>(token: &str, secret: &str) -> Result<C, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<IncomingEnvelope<C>>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims.claims)
    .map_err(|e| {
        tracing::debug!("token rejected: {}", e);
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::BadSignature,
            _ => TokenError::Malformed,
        }
    })
}

/// What a token is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Access,
    Refresh,
    Activation,
    PasswordReset,
}

#[derive(Debug, Clone)]
struct PurposeKey {
    secret: String,
    ttl: i64,
}

/// Per-purpose secrets and lifetimes
#[derive(Debug, Clone)]
pub struct Keyring {
    access: PurposeKey,
    refresh: PurposeKey,
    activation: PurposeKey,
    password_reset: PurposeKey,
}

impl Keyring {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            access: PurposeKey {
                secret: config.access_token_secret.clone(),
                ttl: config.access_token_ttl,
            },
            refresh: PurposeKey {
                secret: config.refresh_token_secret.clone(),
                ttl: config.refresh_token_ttl,
            },
            activation: PurposeKey {
                secret: config.activation_secret.clone(),
                ttl: config.activation_ttl,
            },
            password_reset: PurposeKey {
                secret: config.password_reset_secret.clone(),
                ttl: config.password_reset_ttl,
            },
        }
    }

    fn key(&self, purpose: TokenPurpose) -> &PurposeKey {
        match purpose {
            TokenPurpose::Access => &self.access,
            TokenPurpose::Refresh => &self.refresh,
            TokenPurpose::Activation => &self.activation,
            TokenPurpose::PasswordReset => &self.password_reset,
        }
    }

    pub fn issue<C: Serialize>(&self, purpose: TokenPurpose, claims: &C) -> AppResult<String> {
        let key = self.key(purpose);
        issue(claims, &key.secret, key.ttl)
    }

    pub fn verify<C: DeserializeOwned>(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<C, TokenError> {
        verify(token, &self.key(purpose).secret)
    }
}

/// Claims of a short-lived access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub id: String,
    pub email: String,
    pub role: Role,
}

/// Claims of a refresh token; `jti` keeps consecutive tokens distinct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub id: String,
    pub jti: String,
}

/// Claims of an activation or password-reset code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionClaims {
    pub id: String,
    pub email: String,
}
