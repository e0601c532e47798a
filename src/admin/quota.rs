/// Privileged-role quota
///
/// The count and the write that depends on it are evaluated by the store in a
/// single conditional statement (see `AccountStore::insert_within_quota` and
/// `AccountStore::restore_within_quota`); this type only knows the ceilings
/// and how to report a breach.
use crate::{
    admin::Role,
    config::QuotaConfig,
    error::{AppError, ErrorCode},
};

#[derive(Debug, Clone, Copy)]
pub struct RoleQuota {
    max_admins: i64,
    max_editors: i64,
}

impl RoleQuota {
    pub fn new(max_admins: i64, max_editors: i64) -> Self {
        Self {
            max_admins,
            max_editors,
        }
    }

    pub fn from_config(config: &QuotaConfig) -> Self {
        Self::new(config.max_admins, config.max_editors)
    }

    /// Ceiling for a role, `None` when the role is unbounded
    pub fn ceiling(&self, role: Role) -> Option<i64> {
        match role {
            Role::Admin => Some(self.max_admins),
            Role::Editor => Some(self.max_editors),
            Role::Client => None,
        }
    }

    /// Whether one more non-deleted account of `role` fits next to `current`
    pub fn admits(&self, role: Role, current: i64) -> bool {
        self.ceiling(role).map_or(true, |max| current < max)
    }

    pub fn exceeded(&self, role: Role) -> AppError {
        match role {
            Role::Editor => AppError::conflict(
                ErrorCode::MaxEditors,
                format!(
                    "Maximum number of editors in the system is {}",
                    self.max_editors
                ),
            ),
            _ => AppError::conflict(
                ErrorCode::MaxAdmins,
                format!(
                    "Maximum number of admins in the system is {}",
                    self.max_admins
                ),
            ),
        }
    }
}
