/// Authentication: credential hashing, signed tokens, sessions and request extractors
pub mod password;
pub mod session;
pub mod token;

pub use session::{SessionManager, TokenPair};
pub use token::{AccessClaims, Keyring, TokenError, TokenPurpose};

use crate::{
    admin::{Role, RolePolicy},
    api::middleware::extract_bearer_token,
    context::AppContext,
    error::{AppError, ErrorCode},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::marker::PhantomData;

/// Authenticated caller, taken from a valid access token.
///
/// Access tokens are verified by signature only; handlers that need the
/// account row load it themselves.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub id: String,
    pub email: String,
    pub role: Role,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
            AppError::unauthenticated(ErrorCode::NoAccessToken, "No access token")
        })?;

        let claims = state.sessions.authenticate(&token)?;

        Ok(AuthContext {
            id: claims.id,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// Authenticated caller whose role is admitted by `P`
pub struct Authorized<P: RolePolicy> {
    pub auth: AuthContext,
    _policy: PhantomData<P>,
}

impl<P: RolePolicy> std::ops::Deref for Authorized<P> {
    type Target = AuthContext;

    fn deref(&self) -> &AuthContext {
        &self.auth
    }
}

#[async_trait]
impl<P: RolePolicy> FromRequestParts<AppContext> for Authorized<P> {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;

        if !P::permits(auth.role) {
            tracing::debug!("Role {} refused for {}", auth.role, parts.uri.path());
            return Err(AppError::Forbidden(
                "You are not allowed to perform this action.".to_string(),
            ));
        }

        Ok(Authorized {
            auth,
            _policy: PhantomData,
        })
    }
}
