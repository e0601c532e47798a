/// Account manager
///
/// Orchestrates the account flows over the store, the session manager and
/// the outbound collaborators (mail, identity provider). Every flow that acts
/// on an existing account applies the state gate before doing anything else.
use crate::{
    account::{
        state::{self, require_usable, AccountState},
        AddPasswordRequest, ListUsersQuery, ManagedUserResponse, SignupRequest,
        UpdatePasswordRequest, UserListResponse,
    },
    admin::{Role, RoleQuota},
    auth::{
        password,
        token::{ActionClaims, Keyring, TokenError, TokenPurpose},
        SessionManager, TokenPair,
    },
    db::{account::CreatorSummary, Account, AccountFilter, AccountListing, AccountStore, NewAccount},
    error::{AppError, AppResult, ErrorCode},
    mailer::{EmailSender, EmailTemplate, OutboundEmail},
    oauth::IdentityProvider,
};
use std::sync::Arc;

const DEFAULT_ITEMS_PER_PAGE: i64 = 10;

fn account_not_found() -> AppError {
    AppError::NotFound("Account not found".to_string())
}

fn unable_to_login() -> AppError {
    AppError::rejected(ErrorCode::UnableToLogin, "Unable to login")
}

fn passwords_differ() -> AppError {
    AppError::rejected(
        ErrorCode::PasswordsMustBeTheSame,
        "NewPassword and ConfirmNewPassword should be the same",
    )
}

/// Map an action-code verification failure to a 400
fn code_rejected(err: TokenError) -> AppError {
    match err {
        TokenError::Expired => AppError::rejected(ErrorCode::CodeExpired, "Code has expired"),
        TokenError::BadSignature | TokenError::Malformed => {
            AppError::rejected(ErrorCode::InvalidCode, "Invalid code")
        }
    }
}

/// Account manager service
pub struct AccountManager {
    store: AccountStore,
    sessions: SessionManager,
    keyring: Arc<Keyring>,
    quota: RoleQuota,
    mailer: Arc<dyn EmailSender>,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
}

impl AccountManager {
    pub fn new(
        store: AccountStore,
        sessions: SessionManager,
        keyring: Arc<Keyring>,
        quota: RoleQuota,
        mailer: Arc<dyn EmailSender>,
        identity_provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self {
            store,
            sessions,
            keyring,
            quota,
            mailer,
            identity_provider,
        }
    }

    /// Mint an action code for `account` and mail it. Delivery problems are
    /// logged; the flow that triggered them has already succeeded.
    async fn send_action_code(&self, account: &Account, template: EmailTemplate) -> AppResult<()> {
        let purpose = match template {
            EmailTemplate::ActivateAccount => TokenPurpose::Activation,
            EmailTemplate::ResetPassword => TokenPurpose::PasswordReset,
        };
        let code = self.keyring.issue(
            purpose,
            &ActionClaims {
                id: account.id.clone(),
                email: account.email.clone(),
            },
        )?;

        let email = OutboundEmail {
            to: account.email.clone(),
            name: account.name.clone(),
            template,
            code,
        };

        if let Err(e) = self.mailer.send(email).await {
            tracing::warn!("Failed to send {:?} email to {}: {}", template, account.email, e);
        }

        Ok(())
    }

    /// Load the caller's own account, refusing unusable ones
    pub async fn load_usable(&self, id: &str) -> AppResult<Account> {
        require_usable(self.store.find_by_id(id).await?, account_not_found)
    }

    async fn load(&self, id: &str) -> AppResult<Account> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Self-registration of a client account
    pub async fn create_account(&self, req: SignupRequest) -> AppResult<Account> {
        if let Some(existing) = self.store.find_by_email(&req.email).await? {
            return Err(state::registration_conflict(&existing));
        }

        let account = self
            .store
            .insert(NewAccount {
                email: req.email,
                name: req.name,
                password_hash: Some(password::hash(&req.password)?),
                role: Role::Client,
                active: false,
                created_by: None,
            })
            .await?;

        tracing::info!("Account created: {}", account.id);
        self.send_action_code(&account, EmailTemplate::ActivateAccount)
            .await?;

        Ok(account)
    }

    /// Redeem an activation code.
    ///
    /// Any existing account the code names ends up active. Redeeming for an
    /// account that is already active succeeds without a write. The deleted
    /// flag is left alone, so a deleted account stays refused at signin.
    pub async fn activate(&self, code: &str) -> AppResult<()> {
        let claims: ActionClaims = self
            .keyring
            .verify(TokenPurpose::Activation, code)
            .map_err(code_rejected)?;

        let account = self
            .store
            .find_by_id(&claims.id)
            .await?
            .ok_or_else(account_not_found)?;

        if account.active {
            tracing::debug!("Account {} already active", account.id);
            return Ok(());
        }

        self.store.activate(&account.id).await?;
        tracing::info!(
            "Account activated: {} (was {:?})",
            account.id,
            AccountState::of(&account)
        );
        Ok(())
    }

    /// Password signin
    pub async fn signin(&self, email: &str, candidate: &str) -> AppResult<(Account, TokenPair)> {
        let account = require_usable(self.store.find_by_email(email).await?, unable_to_login)?;

        if !account.has_password() {
            return Err(AppError::rejected(
                ErrorCode::NoPasswordToAccount,
                "Your account doesn't have a password. Use Google to login or click on forgot password to associate a password to your account.",
            ));
        }

        if !password::compare(account.password_hash.as_deref(), candidate) {
            tracing::debug!("Password mismatch for account {}", account.id);
            return Err(unable_to_login());
        }

        let pair = self.sessions.issue(&account).await?;
        Ok((account, pair))
    }

    /// Signin through the external identity provider, registering on first use
    pub async fn oauth_signin(&self, code: &str) -> AppResult<(Account, TokenPair)> {
        let provider = self.identity_provider.as_ref().ok_or_else(|| {
            AppError::IdentityProvider("Google sign-in is not configured".to_string())
        })?;
        let identity = provider.resolve(code).await?;

        let account = match self.store.find_by_email(&identity.email).await? {
            Some(existing) => {
                if existing.role != Role::Client {
                    return Err(AppError::rejected(
                        ErrorCode::ClientOnly,
                        "Admins are not allowed to use this route",
                    ));
                }
                AccountState::of(&existing).ensure_usable()?;
                existing
            }
            None => {
                let created = self
                    .store
                    .insert(NewAccount {
                        email: identity.email,
                        name: identity.name,
                        password_hash: None,
                        role: Role::Client,
                        active: true,
                        created_by: None,
                    })
                    .await?;
                tracing::info!("Account created via Google: {}", created.id);
                created
            }
        };

        let pair = self.sessions.issue(&account).await?;
        Ok((account, pair))
    }

    pub async fn forgot_password(&self, email: &str) -> AppResult<()> {
        let account = require_usable(self.store.find_by_email(email).await?, || {
            AppError::NotFound("User not found".to_string())
        })?;

        self.send_action_code(&account, EmailTemplate::ResetPassword)
            .await
    }

    /// Redeem a password-reset code. Existing sessions are left in place.
    pub async fn reset_password(&self, code: &str, new_password: &str) -> AppResult<()> {
        let claims: ActionClaims = self
            .keyring
            .verify(TokenPurpose::PasswordReset, code)
            .map_err(code_rejected)?;

        let account = require_usable(self.store.find_by_id(&claims.id).await?, || {
            AppError::NotFound("User not found".to_string())
        })?;

        self.store
            .set_password_hash(&account.id, &password::hash(new_password)?)
            .await?;

        tracing::info!("Password reset for account {}", account.id);
        Ok(())
    }

    pub async fn update_password(&self, id: &str, req: UpdatePasswordRequest) -> AppResult<()> {
        let account = self.load_usable(id).await?;

        if !account.has_password() {
            return Err(AppError::rejected(
                ErrorCode::NoPasswordToAccount,
                "Your account doesn't have a password, use add-password route.",
            ));
        }

        if !password::compare(account.password_hash.as_deref(), &req.old_password) {
            return Err(AppError::rejected(
                ErrorCode::PasswordDoesNotMatch,
                "The password provided should match the old password",
            ));
        }

        if req.new_password != req.confirm_new_password {
            return Err(passwords_differ());
        }

        self.store
            .set_password_hash(&account.id, &password::hash(&req.new_password)?)
            .await?;

        tracing::info!("Password updated for account {}", account.id);
        Ok(())
    }

    /// Attach a first password to an account created through the identity provider
    pub async fn add_password(&self, id: &str, req: AddPasswordRequest) -> AppResult<()> {
        let account = self.load_usable(id).await?;

        if account.has_password() {
            return Err(AppError::conflict(
                ErrorCode::PasswordExistAlready,
                "Password exists already.",
            ));
        }

        if req.new_password != req.confirm_new_password {
            return Err(passwords_differ());
        }

        self.store
            .set_password_hash(&account.id, &password::hash(&req.new_password)?)
            .await?;

        tracing::info!("Password added for account {}", account.id);
        Ok(())
    }

    pub async fn has_password(&self, id: &str) -> AppResult<bool> {
        Ok(self.load_usable(id).await?.has_password())
    }

    pub async fn update_name(&self, id: &str, name: &str) -> AppResult<Account> {
        let account = self.load_usable(id).await?;
        self.store.update_name(&account.id, name.trim()).await?;
        self.load(&account.id).await
    }

    async fn managed(&self, account: Account) -> AppResult<ManagedUserResponse> {
        let creator = match &account.created_by {
            Some(creator_id) => self
                .store
                .find_by_id(creator_id)
                .await?
                .map(|c| CreatorSummary {
                    id: c.id,
                    name: c.name,
                    email: c.email,
                }),
            None => None,
        };

        Ok(AccountListing { account, creator }.into())
    }

    /// Admin creation of an Admin or Editor account, bounded by the role quota
    pub async fn create_privileged(
        &self,
        creator_id: &str,
        role: Role,
        req: SignupRequest,
    ) -> AppResult<ManagedUserResponse> {
        let ceiling = self
            .quota
            .ceiling(role)
            .ok_or_else(|| AppError::Internal(format!("{} is not a privileged role", role)))?;

        // Advisory; the insert below re-checks atomically
        let current = self.store.count_live_by_role(role).await?;
        if !self.quota.admits(role, current) {
            return Err(self.quota.exceeded(role));
        }

        if let Some(existing) = self.store.find_by_email(&req.email).await? {
            return Err(state::registration_conflict(&existing));
        }

        let account = self
            .store
            .insert_within_quota(
                NewAccount {
                    email: req.email,
                    name: req.name,
                    password_hash: Some(password::hash(&req.password)?),
                    role,
                    active: false,
                    created_by: Some(creator_id.to_string()),
                },
                ceiling,
            )
            .await?
            .ok_or_else(|| self.quota.exceeded(role))?;

        tracing::info!("{} account {} created by {}", role, account.id, creator_id);
        self.send_action_code(&account, EmailTemplate::ActivateAccount)
            .await?;

        self.managed(account).await
    }

    pub async fn admin_activate(&self, target_id: &str) -> AppResult<ManagedUserResponse> {
        let account = self.load(target_id).await?;
        self.store.activate(&account.id).await?;

        tracing::info!("Account {} activated by admin", account.id);
        let account = self.load(&account.id).await?;
        self.managed(account).await
    }

    /// Switch an account off and end its session
    pub async fn admin_deactivate(
        &self,
        admin_id: &str,
        target_id: &str,
    ) -> AppResult<ManagedUserResponse> {
        if admin_id == target_id {
            return Err(AppError::rejected(
                ErrorCode::CannotDeactivateYourself,
                "Cannot deactivate yourself",
            ));
        }

        let account = self.load(target_id).await?;
        self.store.deactivate(&account.id).await?;

        tracing::info!("Account {} deactivated by {}", account.id, admin_id);
        let account = self.load(&account.id).await?;
        self.managed(account).await
    }

    /// Soft-delete an account and end its session
    pub async fn admin_delete(
        &self,
        admin_id: &str,
        target_id: &str,
    ) -> AppResult<ManagedUserResponse> {
        if admin_id == target_id {
            return Err(AppError::rejected(
                ErrorCode::CannotDeleteYourself,
                "Cannot delete yourself",
            ));
        }

        let account = self.load(target_id).await?;
        self.store.mark_deleted(&account.id).await?;

        tracing::info!("Account {} deleted by {}", account.id, admin_id);
        let account = self.load(&account.id).await?;
        self.managed(account).await
    }

    /// Undo a soft delete; privileged roles must fit under their quota
    pub async fn admin_restore(&self, target_id: &str) -> AppResult<ManagedUserResponse> {
        let account = self.load(target_id).await?;

        if account.deleted {
            let restored = match self.quota.ceiling(account.role) {
                Some(ceiling) => {
                    self.store
                        .restore_within_quota(&account.id, account.role, ceiling)
                        .await?
                }
                None => self.store.restore(&account.id).await?,
            };

            if !restored {
                // Distinguish a concurrent restore from a full quota
                let current = self.load(&account.id).await?;
                if current.deleted {
                    return Err(self.quota.exceeded(account.role));
                }
            }

            tracing::info!("Account {} restored", account.id);
        }

        let account = self.load(&account.id).await?;
        self.managed(account).await
    }

    pub async fn list_users(&self, query: ListUsersQuery) -> AppResult<UserListResponse> {
        let filter = AccountFilter {
            name: query.name.unwrap_or_default(),
            role: query.role.unwrap_or(Role::Client),
            page: query.page.unwrap_or(1),
            items_per_page: query.items_per_page.unwrap_or(DEFAULT_ITEMS_PER_PAGE),
        };

        let (items, count) = self.store.list(&filter).await?;

        Ok(UserListResponse {
            items: items.into_iter().map(Into::into).collect(),
            count,
            page: filter.page,
            items_per_page: filter.items_per_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ServerConfig,
        db::create_memory_pool,
        mailer::MemoryMailer,
        oauth::ExternalIdentity,
    };
    use async_trait::async_trait;

    struct FixedIdentity(Option<ExternalIdentity>);

    #[async_trait]
    impl IdentityProvider for FixedIdentity {
        async fn resolve(&self, _code: &str) -> AppResult<ExternalIdentity> {
            self.0
                .clone()
                .ok_or_else(|| AppError::IdentityProvider("rejected".to_string()))
        }
    }

    struct Harness {
        manager: AccountManager,
        store: AccountStore,
        sessions: SessionManager,
        mailer: Arc<MemoryMailer>,
    }

    async fn harness_with(config: ServerConfig, identity: Option<ExternalIdentity>) -> Harness {
        let store = AccountStore::new(create_memory_pool().await.unwrap());
        let keyring = Arc::new(Keyring::from_config(&config.authentication));
        let sessions = SessionManager::new(store.clone(), keyring.clone());
        let mailer = Arc::new(MemoryMailer::new());
        let provider: Arc<dyn IdentityProvider> = Arc::new(FixedIdentity(identity));

        let manager = AccountManager::new(
            store.clone(),
            sessions.clone(),
            keyring,
            RoleQuota::from_config(&config.quotas),
            mailer.clone(),
            Some(provider),
        );

        Harness {
            manager,
            store,
            sessions,
            mailer,
        }
    }

    async fn harness() -> Harness {
        harness_with(ServerConfig::for_tests(), None).await
    }

    fn signup(email: &str) -> SignupRequest {
        SignupRequest {
            name: "Test User".to_string(),
            email: email.to_string(),
            password: "password1".to_string(),
        }
    }

    /// Register and activate through the emailed code
    async fn active_client(h: &Harness, email: &str) -> Account {
        let account = h.manager.create_account(signup(email)).await.unwrap();
        let code = h
            .mailer
            .last_code(&account.email, EmailTemplate::ActivateAccount)
            .unwrap();
        h.manager.activate(&code).await.unwrap();
        h.store.find_by_id(&account.id).await.unwrap().unwrap()
    }

    async fn admin(h: &Harness, email: &str) -> Account {
        let mut account = active_client(h, email).await;
        sqlx::query("UPDATE account SET role = 'Admin' WHERE id = ?1")
            .bind(&account.id)
            .execute(h.store.pool())
            .await
            .unwrap();
        account.role = Role::Admin;
        account
    }

    #[tokio::test]
    async fn test_create_account_sends_activation_code() {
        let h = harness().await;
        let account = h.manager.create_account(signup("new@example.com")).await.unwrap();

        assert_eq!(account.role, Role::Client);
        assert_eq!(AccountState::of(&account), AccountState::PendingActivation);
        assert!(h
            .mailer
            .last_code("new@example.com", EmailTemplate::ActivateAccount)
            .is_some());
        assert!(h.store.find_by_email("NEW@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_registration_collisions() {
        let h = harness().await;
        h.manager.create_account(signup("p@example.com")).await.unwrap();
        let err = h.manager.create_account(signup("p@example.com")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AccountNotActivated);

        let active = active_client(&h, "a@example.com").await;
        let err = h.manager.create_account(signup("a@example.com")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmailInUse);

        // Switched off by an admin reads as not activated
        h.store.deactivate(&active.id).await.unwrap();
        let err = h.manager.create_account(signup("a@example.com")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AccountNotActivated);

        h.store.mark_deleted(&active.id).await.unwrap();
        let err = h.manager.create_account(signup("a@example.com")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AccountDeleted);
    }

    #[tokio::test]
    async fn test_activation_is_idempotent() {
        let h = harness().await;
        let account = h.manager.create_account(signup("i@example.com")).await.unwrap();
        let code = h
            .mailer
            .last_code("i@example.com", EmailTemplate::ActivateAccount)
            .unwrap();

        h.manager.activate(&code).await.unwrap();
        h.manager.activate(&code).await.unwrap();

        let stored = h.store.find_by_id(&account.id).await.unwrap().unwrap();
        assert_eq!(AccountState::of(&stored), AccountState::Active);
    }

    #[tokio::test]
    async fn test_activation_code_reactivates_deactivated_account() {
        let h = harness().await;
        let account = h.manager.create_account(signup("d@example.com")).await.unwrap();
        let code = h
            .mailer
            .last_code("d@example.com", EmailTemplate::ActivateAccount)
            .unwrap();
        h.manager.activate(&code).await.unwrap();
        h.store.deactivate(&account.id).await.unwrap();

        h.manager.activate(&code).await.unwrap();

        let stored = h.store.find_by_id(&account.id).await.unwrap().unwrap();
        assert_eq!(AccountState::of(&stored), AccountState::Active);
        h.manager.signin(&account.email, "password1").await.unwrap();
    }

    #[tokio::test]
    async fn test_activation_code_on_deleted_account_keeps_it_deleted() {
        let h = harness().await;
        let account = h.manager.create_account(signup("del@example.com")).await.unwrap();
        let code = h
            .mailer
            .last_code("del@example.com", EmailTemplate::ActivateAccount)
            .unwrap();
        h.store.mark_deleted(&account.id).await.unwrap();

        h.manager.activate(&code).await.unwrap();

        let stored = h.store.find_by_id(&account.id).await.unwrap().unwrap();
        assert!(stored.active);
        assert_eq!(AccountState::of(&stored), AccountState::Deleted);
        let err = h.manager.signin(&account.email, "password1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AccountDeleted);
    }

    #[tokio::test]
    async fn test_activation_code_errors() {
        let h = harness().await;
        let err = h.manager.activate("garbage").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCode);

        // A reset code is not an activation code
        let account = active_client(&h, "x@example.com").await;
        h.manager.forgot_password(&account.email).await.unwrap();
        let reset = h
            .mailer
            .last_code(&account.email, EmailTemplate::ResetPassword)
            .unwrap();
        let err = h.manager.activate(&reset).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCode);

        let mut config = ServerConfig::for_tests();
        config.authentication.activation_ttl = -60;
        let h = harness_with(config, None).await;
        h.manager.create_account(signup("late@example.com")).await.unwrap();
        let code = h
            .mailer
            .last_code("late@example.com", EmailTemplate::ActivateAccount)
            .unwrap();
        let err = h.manager.activate(&code).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::CodeExpired);
    }

    #[tokio::test]
    async fn test_activation_for_missing_account() {
        let h = harness().await;
        let account = h.manager.create_account(signup("gone@example.com")).await.unwrap();
        let code = h
            .mailer
            .last_code("gone@example.com", EmailTemplate::ActivateAccount)
            .unwrap();
        sqlx::query("DELETE FROM account WHERE id = ?1")
            .bind(&account.id)
            .execute(h.store.pool())
            .await
            .unwrap();

        let err = h.manager.activate(&code).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_signin_gating() {
        let h = harness().await;

        let err = h.manager.signin("nobody@example.com", "password1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnableToLogin);

        let pending = h.manager.create_account(signup("p@example.com")).await.unwrap();
        let err = h.manager.signin(&pending.email, "password1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AccountNotActivated);

        let account = active_client(&h, "s@example.com").await;
        let err = h.manager.signin(&account.email, "wrong-pass").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnableToLogin);

        let (signed_in, pair) = h.manager.signin("S@example.com", "password1").await.unwrap();
        assert_eq!(signed_in.id, account.id);
        assert_eq!(
            h.store.find_by_id(&account.id).await.unwrap().unwrap().refresh_token,
            Some(pair.refresh_token)
        );

        // Deleted wins over inactive
        h.store.deactivate(&account.id).await.unwrap();
        h.store.mark_deleted(&account.id).await.unwrap();
        let err = h.manager.signin(&account.email, "password1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AccountDeleted);
    }

    #[tokio::test]
    async fn test_oauth_signin_creates_passwordless_client() {
        let identity = ExternalIdentity {
            email: "g@example.com".to_string(),
            name: "Goo Gle".to_string(),
        };
        let h = harness_with(ServerConfig::for_tests(), Some(identity)).await;

        let (account, pair) = h.manager.oauth_signin("code").await.unwrap();
        assert_eq!(account.role, Role::Client);
        assert!(account.active);
        assert!(!account.has_password());
        assert!(h.sessions.authenticate(&pair.access_token).is_ok());

        let err = h.manager.signin("g@example.com", "whatever").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoPasswordToAccount);
        assert!(!h.manager.has_password(&account.id).await.unwrap());

        // Second signin reuses the account
        let (again, _) = h.manager.oauth_signin("code").await.unwrap();
        assert_eq!(again.id, account.id);
    }

    #[tokio::test]
    async fn test_oauth_signin_is_client_only() {
        let identity = ExternalIdentity {
            email: "boss@example.com".to_string(),
            name: "Boss".to_string(),
        };
        let h = harness_with(ServerConfig::for_tests(), Some(identity)).await;
        admin(&h, "boss@example.com").await;

        let err = h.manager.oauth_signin("code").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ClientOnly);
    }

    #[tokio::test]
    async fn test_oauth_provider_failure() {
        let h = harness().await;
        let err = h.manager.oauth_signin("code").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::GoogleAuthError);
    }

    #[tokio::test]
    async fn test_password_reset_flow_keeps_sessions() {
        let h = harness().await;
        let account = active_client(&h, "r@example.com").await;
        let (_, pair) = h.manager.signin(&account.email, "password1").await.unwrap();

        h.manager.forgot_password(&account.email).await.unwrap();
        let code = h
            .mailer
            .last_code(&account.email, EmailTemplate::ResetPassword)
            .unwrap();
        h.manager.reset_password(&code, "newpass").await.unwrap();

        assert!(h.manager.signin(&account.email, "password1").await.is_err());

        // The session from before the reset still rotates
        let (_, rotated) = h.sessions.refresh(Some(&pair.refresh_token)).await.unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);

        assert!(h.manager.signin(&account.email, "newpass").await.is_ok());
    }

    #[tokio::test]
    async fn test_forgot_password_requires_usable_account() {
        let h = harness().await;
        let err = h.manager.forgot_password("none@example.com").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        h.manager.create_account(signup("p@example.com")).await.unwrap();
        let err = h.manager.forgot_password("p@example.com").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AccountNotActivated);
    }

    #[tokio::test]
    async fn test_update_password_rules() {
        let h = harness().await;
        let account = active_client(&h, "u@example.com").await;

        let req = |old: &str, new: &str, confirm: &str| UpdatePasswordRequest {
            old_password: old.to_string(),
            new_password: new.to_string(),
            confirm_new_password: confirm.to_string(),
        };

        let err = h
            .manager
            .update_password(&account.id, req("nope1", "fresh1", "fresh1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PasswordDoesNotMatch);

        let err = h
            .manager
            .update_password(&account.id, req("password1", "fresh1", "fresh2"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PasswordsMustBeTheSame);

        h.manager
            .update_password(&account.id, req("password1", "fresh1", "fresh1"))
            .await
            .unwrap();
        assert!(h.manager.signin(&account.email, "fresh1").await.is_ok());
    }

    #[tokio::test]
    async fn test_add_password() {
        let identity = ExternalIdentity {
            email: "g@example.com".to_string(),
            name: "G".to_string(),
        };
        let h = harness_with(ServerConfig::for_tests(), Some(identity)).await;
        let (account, _) = h.manager.oauth_signin("code").await.unwrap();

        let req = |new: &str, confirm: &str| AddPasswordRequest {
            new_password: new.to_string(),
            confirm_new_password: confirm.to_string(),
        };

        let err = h
            .manager
            .add_password(&account.id, req("first1", "other1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PasswordsMustBeTheSame);

        h.manager.add_password(&account.id, req("first1", "first1")).await.unwrap();
        assert!(h.manager.has_password(&account.id).await.unwrap());

        let err = h
            .manager
            .add_password(&account.id, req("again1", "again1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PasswordExistAlready);
    }

    #[tokio::test]
    async fn test_update_name() {
        let h = harness().await;
        let account = active_client(&h, "n@example.com").await;
        let updated = h.manager.update_name(&account.id, "  Renamed ").await.unwrap();
        assert_eq!(updated.name, "Renamed");
    }

    #[tokio::test]
    async fn test_privileged_quota() {
        let mut config = ServerConfig::for_tests();
        config.quotas.max_editors = 1;
        let h = harness_with(config, None).await;
        let boss = admin(&h, "boss@example.com").await;

        let editor = h
            .manager
            .create_privileged(&boss.id, Role::Editor, signup("e1@example.com"))
            .await
            .unwrap();
        assert_eq!(editor.role, Role::Editor);
        assert!(!editor.active);
        assert_eq!(editor.creator.as_ref().unwrap().id, boss.id);

        let err = h
            .manager
            .create_privileged(&boss.id, Role::Editor, signup("e2@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MaxEditors);
        assert_eq!(h.store.count_live_by_role(Role::Editor).await.unwrap(), 1);

        // Deleting frees the slot; restoring over a full quota fails
        h.manager.admin_delete(&boss.id, &editor.id).await.unwrap();
        h.manager
            .create_privileged(&boss.id, Role::Editor, signup("e2@example.com"))
            .await
            .unwrap();
        let err = h.manager.admin_restore(&editor.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::MaxEditors);
        assert_eq!(h.store.count_live_by_role(Role::Editor).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_admin_quota_counts_existing_admins() {
        let h = harness().await;
        let boss = admin(&h, "boss@example.com").await;

        for i in 0..2 {
            h.manager
                .create_privileged(&boss.id, Role::Admin, signup(&format!("a{}@example.com", i)))
                .await
                .unwrap();
        }

        let err = h
            .manager
            .create_privileged(&boss.id, Role::Admin, signup("a9@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MaxAdmins);
    }

    #[tokio::test]
    async fn test_admin_lifecycle() {
        let h = harness().await;
        let boss = admin(&h, "boss@example.com").await;
        let user = active_client(&h, "user@example.com").await;
        let (_, pair) = h.manager.signin(&user.email, "password1").await.unwrap();

        let err = h.manager.admin_deactivate(&boss.id, &boss.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::CannotDeactivateYourself);
        let err = h.manager.admin_delete(&boss.id, &boss.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::CannotDeleteYourself);
        let err = h.manager.admin_delete(&boss.id, "missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let view = h.manager.admin_deactivate(&boss.id, &user.id).await.unwrap();
        assert!(!view.active);
        let err = h.sessions.refresh(Some(&pair.refresh_token)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ReuseDetection);

        let view = h.manager.admin_activate(&user.id).await.unwrap();
        assert!(view.active);
        assert!(h.manager.signin(&user.email, "password1").await.is_ok());

        let view = h.manager.admin_delete(&boss.id, &user.id).await.unwrap();
        assert!(view.deleted);
        assert!(h.store.find_by_id(&user.id).await.unwrap().unwrap().refresh_token.is_none());

        let view = h.manager.admin_restore(&user.id).await.unwrap();
        assert!(!view.deleted);
        assert!(view.active);
    }

    #[tokio::test]
    async fn test_list_users() {
        let h = harness().await;
        let boss = admin(&h, "boss@example.com").await;
        active_client(&h, "c1@example.com").await;
        active_client(&h, "c2@example.com").await;
        h.manager
            .create_privileged(&boss.id, Role::Editor, signup("e@example.com"))
            .await
            .unwrap();

        let clients = h.manager.list_users(ListUsersQuery::default()).await.unwrap();
        assert_eq!(clients.count, 2);
        assert_eq!(clients.page, 1);
        assert_eq!(clients.items_per_page, 10);

        let editors = h
            .manager
            .list_users(ListUsersQuery {
                role: Some(Role::Editor),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(editors.count, 1);
        assert_eq!(editors.items[0].creator.as_ref().unwrap().email, "boss@example.com");
    }
}
