/// Account roles and route capability sets
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Ordinary self-registered user
    Client,
    /// Can manage catalog content
    Editor,
    /// Full access, can provision other privileged accounts
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "Client",
            Role::Editor => "Editor",
            Role::Admin => "Admin",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Role::Client => 1,
            Role::Editor => 1 << 1,
            Role::Admin => 1 << 2,
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "editor" => Ok(Role::Editor),
            "admin" => Ok(Role::Admin),
            _ => Err(AppError::Validation(format!("Invalid role: {}", s))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of roles a route accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const fn empty() -> Self {
        RoleSet(0)
    }

    pub const fn with(self, role: Role) -> Self {
        RoleSet(self.0 | role.bit())
    }

    pub const fn contains(&self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }
}

/// Route-level declaration of who may call it.
///
/// Handlers name a policy type in their extractor (`Authorized<AdminOnly>`);
/// one generic guard evaluates membership.
pub trait RolePolicy: Send + Sync + 'static {
    const ALLOWED: RoleSet;

    fn permits(role: Role) -> bool {
        Self::ALLOWED.contains(role)
    }
}

/// Administrators only
pub struct AdminOnly;

impl RolePolicy for AdminOnly {
    const ALLOWED: RoleSet = RoleSet::empty().with(Role::Admin);
}

/// Regular clients only
pub struct ClientOnly;

impl RolePolicy for ClientOnly {
    const ALLOWED: RoleSet = RoleSet::empty().with(Role::Client);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_str() {
        assert_eq!("Client".parse::<Role>().unwrap(), Role::Client);
        assert_eq!("editor".parse::<Role>().unwrap(), Role::Editor);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);

        assert!("superadmin".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_set_membership() {
        let set = RoleSet::empty().with(Role::Editor).with(Role::Admin);
        assert!(set.contains(Role::Admin));
        assert!(set.contains(Role::Editor));
        assert!(!set.contains(Role::Client));
    }

    #[test]
    fn test_policies() {
        assert!(AdminOnly::permits(Role::Admin));
        assert!(!AdminOnly::permits(Role::Editor));
        assert!(!AdminOnly::permits(Role::Client));

        assert!(ClientOnly::permits(Role::Client));
        assert!(!ClientOnly::permits(Role::Admin));
    }
}
