/// Configuration management for the Lewalink auth service
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Minimum accepted length for any signing secret
pub const MIN_SECRET_LENGTH: usize = 32;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub quotas: QuotaConfig,
    pub email: Option<EmailConfig>,
    pub oauth: Option<GoogleOAuthConfig>,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Base URL of the web client, used to build links in emails
    pub frontend_url: String,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub account_db: PathBuf,
}

/// Authentication configuration
///
/// Every token purpose gets its own secret so a token minted for one flow
/// never verifies in another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub activation_secret: String,
    pub password_reset_secret: String,
    /// Lifetimes in seconds
    pub access_token_ttl: i64,
    pub refresh_token_ttl: i64,
    pub activation_ttl: i64,
    pub password_reset_ttl: i64,
}

/// Ceilings on privileged accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub max_admins: i64,
    pub max_editors: i64,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Google sign-in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub level: String,
}

impl LoggingConfig {
    /// Filter for the subscriber; `RUST_LOG` overrides the configured level
    pub fn env_filter(&self) -> AppResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|e| {
            AppError::Validation(format!("Invalid log level {:?}: {}", self.level, e))
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn required(key: &str) -> AppResult<String> {
    env::var(key).map_err(|_| AppError::Validation(format!("{} must be defined", key)))
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("LEWALINK_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("LEWALINK_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let frontend_url = env::var("LEWALINK_FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());
        let version =
            env::var("LEWALINK_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("LEWALINK_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let account_db = env::var("LEWALINK_ACCOUNT_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("account.sqlite"));

        let authentication = AuthConfig {
            access_token_secret: required("ACCESS_TOKEN_JWT_KEY")?,
            refresh_token_secret: required("REFRESH_TOKEN_JWT_KEY")?,
            activation_secret: required("ACTIVATE_ACCOUNT_JWT_KEY")?,
            password_reset_secret: required("FORGOT_PASSWORD_JWT_KEY")?,
            access_token_ttl: env_or("ACCESS_TOKEN_TTL_SECS", 24 * 3600),
            refresh_token_ttl: env_or("REFRESH_TOKEN_TTL_SECS", 7 * 24 * 3600),
            activation_ttl: env_or("ACTIVATE_ACCOUNT_TTL_SECS", 7 * 24 * 3600),
            password_reset_ttl: env_or("FORGOT_PASSWORD_TTL_SECS", 3600),
        };

        let quotas = QuotaConfig {
            max_admins: env_or("TOTAL_ADMINS_IN_SYSTEM", 3),
            max_editors: env_or("TOTAL_EDITORS_IN_SYSTEM", 3),
        };

        let email = if let Ok(smtp_url) = env::var("LEWALINK_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("LEWALINK_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| "noreply@lewalink.com".to_string()),
            })
        } else {
            None
        };

        let oauth = match (
            env::var("GOOGLE_CLIENT_ID"),
            env::var("GOOGLE_CLIENT_SECRET"),
        ) {
            (Ok(client_id), Ok(client_secret)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
                redirect_uri: env::var("GOOGLE_REDIRECT_URI")
                    .unwrap_or_else(|_| "postmessage".to_string()),
            }),
            _ => None,
        };

        let log_level = env::var("LEWALINK_LOG_LEVEL")
            .unwrap_or_else(|_| "lewalink=debug,tower_http=debug".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                frontend_url,
                version,
            },
            storage: StorageConfig {
                data_directory,
                account_db,
            },
            authentication,
            quotas,
            email,
            oauth,
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        let auth = &self.authentication;
        let secrets = [
            ("access token", &auth.access_token_secret),
            ("refresh token", &auth.refresh_token_secret),
            ("activation", &auth.activation_secret),
            ("password reset", &auth.password_reset_secret),
        ];

        for (name, secret) in &secrets {
            if secret.len() < MIN_SECRET_LENGTH {
                return Err(AppError::Validation(format!(
                    "The {} secret must be at least {} characters",
                    name, MIN_SECRET_LENGTH
                )));
            }
        }

        for (i, (a_name, a)) in secrets.iter().enumerate() {
            for (b_name, b) in secrets.iter().skip(i + 1) {
                if a == b {
                    return Err(AppError::Validation(format!(
                        "The {} and {} secrets must differ",
                        a_name, b_name
                    )));
                }
            }
        }

        let ttls = [
            auth.access_token_ttl,
            auth.refresh_token_ttl,
            auth.activation_ttl,
            auth.password_reset_ttl,
        ];
        if ttls.iter().any(|ttl| *ttl <= 0) {
            return Err(AppError::Validation(
                "Token lifetimes must be positive".to_string(),
            ));
        }

        if self.quotas.max_admins < 1 || self.quotas.max_editors < 1 {
            return Err(AppError::Validation(
                "Role quotas must allow at least one account".to_string(),
            ));
        }

        EnvFilter::try_new(&self.logging.level).map_err(|e| {
            AppError::Validation(format!("Invalid log level {:?}: {}", self.logging.level, e))
        })?;

        Ok(())
    }

    /// Configuration suitable for tests: in-memory storage, fixed secrets, no email.
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 3000,
                frontend_url: "http://localhost:5173".to_string(),
                version: "0.1.0".to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                account_db: PathBuf::from(":memory:"),
            },
            authentication: AuthConfig {
                access_token_secret: "test-access-secret-0123456789abcdef".to_string(),
                refresh_token_secret: "test-refresh-secret-0123456789abcdef".to_string(),
                activation_secret: "test-activation-secret-0123456789abcdef".to_string(),
                password_reset_secret: "test-reset-secret-0123456789abcdef".to_string(),
                access_token_ttl: 3600,
                refresh_token_ttl: 7 * 24 * 3600,
                activation_ttl: 24 * 3600,
                password_reset_ttl: 3600,
            },
            quotas: QuotaConfig {
                max_admins: 3,
                max_editors: 3,
            },
            email: None,
            oauth: None,
            logging: LoggingConfig {
                level: "debug".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_test_config_is_valid() {
        ServerConfig::for_tests().validate().unwrap();
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = ServerConfig::for_tests();
        config.authentication.activation_secret = "short".to_string();
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_shared_secret_rejected() {
        let mut config = ServerConfig::for_tests();
        config.authentication.refresh_token_secret =
            config.authentication.access_token_secret.clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_zero_quota_rejected() {
        let mut config = ServerConfig::for_tests();
        config.quotas.max_editors = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = ServerConfig::for_tests();
        config.logging.level = "lewalink=loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));

        config.logging.level = "lewalink=trace,sqlx=warn".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let mut config = ServerConfig::for_tests();
        config.authentication.password_reset_ttl = 0;
        assert!(config.validate().is_err());
    }
}
