/// Roles, route capabilities and the privileged-role quota
///
/// Roles decide what an authenticated caller may reach; the quota bounds how
/// many non-deleted Admin and Editor accounts may exist at once.

pub mod quota;
pub mod roles;

pub use quota::RoleQuota;
pub use roles::{AdminOnly, ClientOnly, Role, RolePolicy, RoleSet};
