/// Session issuance and refresh-token rotation
///
/// Each account stores at most one refresh token. Issuing a pair overwrites
/// it; rotating swaps it only if it still holds the presented value. A token
/// that verifies but matches no stored pointer has been superseded, so its
/// account's session is revoked outright.
use crate::{
    account::state::AccountState,
    auth::token::{AccessClaims, Keyring, RefreshClaims, TokenError, TokenPurpose},
    db::{Account, AccountStore},
    error::{AppError, AppResult, ErrorCode},
};
use std::sync::Arc;
use uuid::Uuid;

/// Freshly minted access/refresh tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

fn cannot_decode() -> AppError {
    AppError::unauthenticated(ErrorCode::CannotDecodeToken, "Cannot decode token")
}

/// Issues, rotates and revokes sessions
#[derive(Clone)]
pub struct SessionManager {
    store: AccountStore,
    keyring: Arc<Keyring>,
}

impl SessionManager {
    pub fn new(store: AccountStore, keyring: Arc<Keyring>) -> Self {
        Self { store, keyring }
    }

    fn mint(&self, account: &Account) -> AppResult<TokenPair> {
        let access_token = self.keyring.issue(
            TokenPurpose::Access,
            &AccessClaims {
                id: account.id.clone(),
                email: account.email.clone(),
                role: account.role,
            },
        )?;
        let refresh_token = self.keyring.issue(
            TokenPurpose::Refresh,
            &RefreshClaims {
                id: account.id.clone(),
                jti: Uuid::new_v4().to_string(),
            },
        )?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Mint a pair and make its refresh token the account's only valid one
    pub async fn issue(&self, account: &Account) -> AppResult<TokenPair> {
        let pair = self.mint(account)?;
        let stored = self
            .store
            .set_refresh_token(&account.id, &pair.refresh_token)
            .await?;
        if !stored {
            return Err(AppError::NotFound("Account not found".to_string()));
        }

        tracing::info!("Session issued for account {}", account.id);
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair
    pub async fn refresh(&self, presented: Option<&str>) -> AppResult<(Account, TokenPair)> {
        let token = presented
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::unauthenticated(ErrorCode::NoRefreshToken, "No refresh token"))?;

        match self.store.find_by_refresh_token(token).await? {
            Some(account) => self.rotate(account, token).await,
            None => Err(self.reject_unknown(token).await),
        }
    }

    async fn rotate(&self, account: Account, presented: &str) -> AppResult<(Account, TokenPair)> {
        let claims: RefreshClaims = self
            .keyring
            .verify(TokenPurpose::Refresh, presented)
            .map_err(|e| match e {
                TokenError::Expired => AppError::unauthenticated(
                    ErrorCode::RefreshTokenExpired,
                    "Refresh token has expired, login again.",
                ),
                TokenError::BadSignature | TokenError::Malformed => cannot_decode(),
            })?;

        if claims.id != account.id {
            tracing::warn!(
                "Refresh token for {} is stored on account {}",
                claims.id,
                account.id
            );
            return Err(AppError::unauthenticated(
                ErrorCode::Unauthorized,
                "Not authorized",
            ));
        }

        AccountState::of(&account)
            .ensure_usable()
            .map_err(AppError::into_unauthenticated)?;

        let pair = self.mint(&account)?;
        let swapped = self
            .store
            .replace_refresh_token(&account.id, presented, &pair.refresh_token)
            .await?;

        if !swapped {
            // Another request moved the pointer after our lookup
            tracing::warn!(
                "Concurrent refresh on account {}, revoking session",
                account.id
            );
            self.store.clear_refresh_token(&account.id).await?;
            return Err(AppError::SecurityAlert("Reuse detection".to_string()));
        }

        tracing::debug!("Refresh token rotated for account {}", account.id);
        Ok((account, pair))
    }

    async fn reject_unknown(&self, presented: &str) -> AppError {
        let claims: RefreshClaims = match self.keyring.verify(TokenPurpose::Refresh, presented) {
            Ok(claims) => claims,
            Err(_) => return cannot_decode(),
        };

        tracing::warn!(
            "Superseded refresh token presented for account {}, revoking session",
            claims.id
        );

        match self.store.clear_refresh_token(&claims.id).await {
            Ok(_) => AppError::SecurityAlert("Reuse detection".to_string()),
            Err(e) => e,
        }
    }

    /// End the account's session
    pub async fn logout(&self, account_id: &str) -> AppResult<()> {
        self.store.clear_refresh_token(account_id).await?;
        tracing::info!("Account {} logged out", account_id);
        Ok(())
    }

    /// Verify an access token; never touches storage
    pub fn authenticate(&self, token: &str) -> AppResult<AccessClaims> {
        self.keyring
            .verify(TokenPurpose::Access, token)
            .map_err(|e| match e {
                TokenError::Expired => AppError::unauthenticated(
                    ErrorCode::AccessTokenExpired,
                    "Access token has expired.",
                ),
                TokenError::BadSignature | TokenError::Malformed => AppError::unauthenticated(
                    ErrorCode::CannotDecodeToken,
                    "Cannot decode access token",
                ),
            })
    }
}
