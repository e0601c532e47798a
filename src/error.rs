/// Unified error types for the Lewalink auth service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable machine-readable failure codes carried by every error response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationRequestError,
    NotFound,
    EmailInUse,
    AccountNotActivated,
    AccountDeleted,
    UnableToLogin,
    NoPasswordToAccount,
    PasswordDoesNotMatch,
    PasswordsMustBeTheSame,
    PasswordExistAlready,
    InvalidCode,
    CodeExpired,
    NoAccessToken,
    AccessTokenExpired,
    NoRefreshToken,
    RefreshTokenExpired,
    CannotDecodeToken,
    ReuseDetection,
    Unauthorized,
    NotAllowed,
    ClientOnly,
    MaxAdmins,
    MaxEditors,
    CannotDeleteYourself,
    CannotDeactivateYourself,
    GoogleAuthError,
    UnexpectedError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationRequestError => "VALIDATION_REQUEST_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::EmailInUse => "EMAIL_IN_USE",
            ErrorCode::AccountNotActivated => "ACCOUNT_NOT_ACTIVATED",
            ErrorCode::AccountDeleted => "ACCOUNT_DELETED",
            ErrorCode::UnableToLogin => "UNABLE_TO_LOGIN",
            ErrorCode::NoPasswordToAccount => "NO_PASSWORD_TO_ACCOUNT",
            ErrorCode::PasswordDoesNotMatch => "PASSWORD_DOES_NOT_MATCH",
            ErrorCode::PasswordsMustBeTheSame => "PASSWORDS_MUST_BE_THE_SAME",
            ErrorCode::PasswordExistAlready => "PASSWORD_EXIST_ALREADY",
            ErrorCode::InvalidCode => "INVALID_CODE",
            ErrorCode::CodeExpired => "CODE_EXPIRED",
            ErrorCode::NoAccessToken => "NO_ACCESS_TOKEN",
            ErrorCode::AccessTokenExpired => "ACCESS_TOKEN_EXPIRED",
            ErrorCode::NoRefreshToken => "NO_REFRESH_TOKEN",
            ErrorCode::RefreshTokenExpired => "REFRESH_TOKEN_EXPIRED",
            ErrorCode::CannotDecodeToken => "CANNOT_DECODE_TOKEN",
            ErrorCode::ReuseDetection => "REUSE_DETECTION",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::NotAllowed => "NOT_ALLOWED",
            ErrorCode::ClientOnly => "CLIENT_ONLY",
            ErrorCode::MaxAdmins => "MAX_ADMINS",
            ErrorCode::MaxEditors => "MAX_EDITORS",
            ErrorCode::CannotDeleteYourself => "CANNOT_DELETE_YOURSELF",
            ErrorCode::CannotDeactivateYourself => "CANNOT_DEACTIVATE_YOURSELF",
            ErrorCode::GoogleAuthError => "GOOGLE_AUTH_ERROR",
            ErrorCode::UnexpectedError => "UNEXPECTED_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the service
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed input, rejected before reaching the core
    #[error("Validation error: {0}")]
    Validation(String),

    /// No such account or code target
    #[error("Not found: {0}")]
    NotFound(String),

    /// Email in use, quota exceeded, password already present
    #[error("Conflict: {message}")]
    Conflict { code: ErrorCode, message: String },

    /// Request refused for a reason the caller can correct (bad credentials,
    /// invalid action code, mismatched passwords, acting on oneself)
    #[error("Rejected: {message}")]
    Rejected { code: ErrorCode, message: String },

    /// The account exists but the operation is not legal in its current state
    #[error("Illegal account state: {message}")]
    StateIllegal { code: ErrorCode, message: String },

    /// Missing, expired or undecodable credentials
    #[error("Authentication failed: {message}")]
    Unauthenticated { code: ErrorCode, message: String },

    /// Refresh token reuse; the account's session has been revoked
    #[error("Security alert: {0}")]
    SecurityAlert(String),

    /// Caller's role is not in the route's allowed set
    #[error("Not allowed: {0}")]
    Forbidden(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// External identity provider failure
    #[error("Identity provider error: {0}")]
    IdentityProvider(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn conflict(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError::Rejected {
            code,
            message: message.into(),
        }
    }

    pub fn state_illegal(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError::StateIllegal {
            code,
            message: message.into(),
        }
    }

    pub fn unauthenticated(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError::Unauthenticated {
            code,
            message: message.into(),
        }
    }

    /// Re-tag a state refusal as an authentication failure.
    ///
    /// The refresh endpoint reports not-activated and deleted accounts as 401s
    /// rather than 400s; every other kind passes through unchanged.
    pub fn into_unauthenticated(self) -> Self {
        match self {
            AppError::StateIllegal { code, message } => AppError::Unauthenticated { code, message },
            other => other,
        }
    }

    /// Machine-readable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation(_) => ErrorCode::ValidationRequestError,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Conflict { code, .. }
            | AppError::Rejected { code, .. }
            | AppError::StateIllegal { code, .. }
            | AppError::Unauthenticated { code, .. } => *code,
            AppError::SecurityAlert(_) => ErrorCode::ReuseDetection,
            AppError::Forbidden(_) => ErrorCode::NotAllowed,
            AppError::IdentityProvider(_) => ErrorCode::GoogleAuthError,
            AppError::Database(_) | AppError::Io(_) | AppError::Internal(_) => {
                ErrorCode::UnexpectedError
            }
        }
    }

    /// HTTP status family for this error
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::Conflict { .. }
            | AppError::Rejected { .. }
            | AppError::StateIllegal { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthenticated { .. } | AppError::SecurityAlert(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::IdentityProvider(_)
            | AppError::Database(_)
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field))
                })
            })
            .collect();
        messages.sort();
        AppError::Validation(messages.join(", "))
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("database error: {}", e);
                "Something went wrong".to_string()
            }
            AppError::Io(e) => {
                tracing::error!("io error: {}", e);
                "Something went wrong".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                "Something went wrong".to_string()
            }
            AppError::IdentityProvider(e) => {
                tracing::warn!("identity provider error: {}", e);
                "Failed to authenticate with Google".to_string()
            }
            AppError::Validation(m)
            | AppError::NotFound(m)
            | AppError::SecurityAlert(m)
            | AppError::Forbidden(m) => m.clone(),
            AppError::Conflict { message, .. }
            | AppError::Rejected { message, .. }
            | AppError::StateIllegal { message, .. }
            | AppError::Unauthenticated { message, .. } => message.clone(),
        };

        (status, Json(ErrorResponse { code, message })).into_response()
    }
}

/// Result type alias for service operations
pub type AppResult<T> = Result<T, AppError>;
