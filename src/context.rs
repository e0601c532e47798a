/// Application context and dependency injection
use crate::{
    account::AccountManager,
    admin::RoleQuota,
    auth::{Keyring, SessionManager},
    config::ServerConfig,
    db::{self, AccountStore},
    error::{AppError, AppResult},
    mailer::{EmailSender, Mailer},
    oauth::{GoogleIdentityProvider, IdentityProvider},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub account_db: SqlitePool,
    pub sessions: SessionManager,
    pub account_manager: Arc<AccountManager>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        config.validate()?;

        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory)
                .await
                .map_err(|e| {
                    AppError::Internal(format!(
                        "Failed to create directory {:?}: {}",
                        config.storage.data_directory, e
                    ))
                })?;
        }

        let account_db =
            db::create_pool(&config.storage.account_db, db::DatabaseOptions::default()).await?;
        db::run_migrations(&account_db).await?;
        db::test_connection(&account_db).await?;

        let mailer = Mailer::new(config.email.as_ref(), &config.service.frontend_url)?;
        if !mailer.is_configured() {
            tracing::warn!("SMTP not configured, action codes will not be emailed");
        }

        let identity_provider: Option<Arc<dyn IdentityProvider>> = match &config.oauth {
            Some(oauth) => Some(Arc::new(GoogleIdentityProvider::new(oauth.clone())?)),
            None => {
                tracing::info!("Google sign-in disabled");
                None
            }
        };

        Ok(Self::with_parts(
            config,
            account_db,
            Arc::new(mailer),
            identity_provider,
        ))
    }

    /// Wire the services over an existing pool and collaborators
    pub fn with_parts(
        config: ServerConfig,
        account_db: SqlitePool,
        mailer: Arc<dyn EmailSender>,
        identity_provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        let store = AccountStore::new(account_db.clone());
        let keyring = Arc::new(Keyring::from_config(&config.authentication));
        let sessions = SessionManager::new(store.clone(), keyring.clone());

        let account_manager = Arc::new(AccountManager::new(
            store,
            sessions.clone(),
            keyring,
            RoleQuota::from_config(&config.quotas),
            mailer,
            identity_provider,
        ));

        Self {
            config: Arc::new(config),
            account_db,
            sessions,
            account_manager,
        }
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
