/// Account management
///
/// Registration, activation, signin, password flows, profile and the admin
/// lifecycle operations, plus the request and response shapes the API speaks.
mod manager;
pub mod state;

pub use manager::AccountManager;
pub use state::AccountState;

use crate::{
    admin::Role,
    db::{account::CreatorSummary, Account, AccountListing},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Self-registration, and admin creation of privileged accounts
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1, message = "Name must be valid"))]
    pub name: String,
    #[validate(email(message = "Email must be valid"))]
    pub email: String,
    #[validate(length(min = 5, max = 20, message = "Password must be between 5 and 20 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SigninRequest {
    #[validate(email(message = "Email must be valid"))]
    pub email: String,
    #[validate(length(min = 5, max = 20, message = "Password must be between 5 and 20 characters"))]
    pub password: String,
}

/// Activation and external-identity requests carry a single code
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CodeRequest {
    #[validate(length(min = 1, message = "Provide a code"))]
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Email must be valid"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Provide a code"))]
    pub code: String,
    #[validate(length(min = 4, max = 20, message = "Password must be between 4 and 20 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[validate(length(min = 1, message = "Old password must be valid"))]
    pub old_password: String,
    #[validate(length(min = 5, max = 20, message = "Password must be between 5 and 20 characters"))]
    pub new_password: String,
    #[validate(length(min = 1, message = "Confirm new password must be provided"))]
    pub confirm_new_password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddPasswordRequest {
    #[validate(length(min = 5, max = 20, message = "Password must be between 5 and 20 characters"))]
    pub new_password: String,
    #[validate(length(min = 1, message = "Confirm new password must be provided"))]
    pub confirm_new_password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateAccountRequest {
    #[validate(length(min = 1, message = "Name must be valid"))]
    pub name: String,
}

/// Query string of the admin user listing
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    pub name: Option<String>,
    #[serde(alias = "userType")]
    pub role: Option<Role>,
    #[validate(range(min = 1, message = "Page must be at least 1"))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100, message = "Items per page must be between 1 and 100"))]
    pub items_per_page: Option<i64>,
}

/// Account as returned to its owner, with tokens after signin or refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl From<&Account> for UserResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            name: account.name.clone(),
            email: account.email.clone(),
            role: account.role,
            created_at: account.created_at,
            updated_at: account.updated_at,
            access_token: None,
            refresh_token: None,
        }
    }
}

/// Account as seen by an admin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedUserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub creator: Option<CreatorSummary>,
}

impl From<AccountListing> for ManagedUserResponse {
    fn from(listing: AccountListing) -> Self {
        let AccountListing { account, creator } = listing;
        Self {
            id: account.id,
            name: account.name,
            email: account.email,
            role: account.role,
            active: account.active,
            deleted: account.deleted,
            created_at: account.created_at,
            updated_at: account.updated_at,
            creator,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListResponse {
    pub items: Vec<ManagedUserResponse>,
    pub count: i64,
    pub page: i64,
    pub items_per_page: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HasPasswordResponse {
    pub has_password: bool,
}
