/// Account lifecycle states
///
/// The stored flags (`active`, `deleted`, `activated_at`) are independent
/// columns; this module is the one place that reads them as a state.
/// Every gate checks existence, then deletion, then activation.
use crate::{
    db::Account,
    error::{AppError, AppResult, ErrorCode},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    /// Registered, never activated
    PendingActivation,
    Active,
    /// Previously active, switched off by an admin
    Deactivated,
    Deleted,
}

impl AccountState {
    pub fn of(account: &Account) -> Self {
        if account.deleted {
            AccountState::Deleted
        } else if account.active {
            AccountState::Active
        } else if account.activated_at.is_some() {
            AccountState::Deactivated
        } else {
            AccountState::PendingActivation
        }
    }

    /// Refuse anything but `Active`
    pub fn ensure_usable(self) -> AppResult<()> {
        match self {
            AccountState::Active => Ok(()),
            AccountState::Deleted => Err(deleted()),
            AccountState::PendingActivation | AccountState::Deactivated => Err(not_activated()),
        }
    }
}

pub(crate) fn deleted() -> AppError {
    AppError::state_illegal(
        ErrorCode::AccountDeleted,
        "Your account has been deleted, contact support.",
    )
}

pub(crate) fn not_activated() -> AppError {
    AppError::state_illegal(ErrorCode::AccountNotActivated, "Activate your account")
}

/// Existence, then state. `missing` builds the error for an absent account,
/// which differs per flow (signin hides it behind UNABLE_TO_LOGIN).
pub fn require_usable(
    account: Option<Account>,
    missing: impl FnOnce() -> AppError,
) -> AppResult<Account> {
    let account = account.ok_or_else(missing)?;
    AccountState::of(&account).ensure_usable()?;
    Ok(account)
}

/// Refusal for registering over an existing email
pub fn registration_conflict(existing: &Account) -> AppError {
    match AccountState::of(existing) {
        AccountState::Deleted => AppError::conflict(
            ErrorCode::AccountDeleted,
            "Account has been deleted, contact support team.",
        ),
        AccountState::PendingActivation | AccountState::Deactivated => AppError::conflict(
            ErrorCode::AccountNotActivated,
            "Account exist already but has not been activated, check email.",
        ),
        AccountState::Active => {
            AppError::conflict(ErrorCode::EmailInUse, "Email exist already in use")
        }
    }
}
