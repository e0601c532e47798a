/// External identity providers
///
/// A provider turns an authorization code from the web client into a verified
/// email and display name. The account layer decides what to do with it.
use crate::{
    config::GoogleOAuthConfig,
    error::{AppError, AppResult},
};
use async_trait::async_trait;
use serde::Deserialize;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// Identity vouched for by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub email: String,
    pub name: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, code: &str) -> AppResult<ExternalIdentity>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
    name: Option<String>,
    email_verified: Option<bool>,
}

/// Google sign-in over the OAuth 2.0 authorization-code flow
#[derive(Clone)]
pub struct GoogleIdentityProvider {
    config: GoogleOAuthConfig,
    http_client: reqwest::Client,
}

impl GoogleIdentityProvider {
    pub fn new(config: GoogleOAuthConfig) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("lewalink/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn exchange_code(&self, code: &str) -> AppResult<String> {
        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::IdentityProvider(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::IdentityProvider(format!(
                "Token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::IdentityProvider(format!("Invalid token response: {}", e)))?;

        Ok(token.access_token)
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    async fn resolve(&self, code: &str) -> AppResult<ExternalIdentity> {
        let access_token = self.exchange_code(code).await?;

        let response = self
            .http_client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| AppError::IdentityProvider(format!("Userinfo request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::IdentityProvider(format!(
                "Userinfo endpoint returned {}",
                response.status()
            )));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| AppError::IdentityProvider(format!("Invalid userinfo response: {}", e)))?;

        into_identity(info)
    }
}

fn into_identity(info: UserInfo) -> AppResult<ExternalIdentity> {
    if info.email_verified == Some(false) {
        return Err(AppError::IdentityProvider(
            "Google account email is not verified".to_string(),
        ));
    }

    match (info.email, info.name) {
        (Some(email), Some(name)) if !email.is_empty() && !name.is_empty() => {
            Ok(ExternalIdentity { email, name })
        }
        _ => Err(AppError::IdentityProvider(
            "Google profile is missing email or name".to_string(),
        )),
    }
}
