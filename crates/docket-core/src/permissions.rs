//! Permission lookup collaborator and the built-in permission names.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::model::UserId;

pub const ASSIGN: &str = "ticket:assign";
pub const APPROVE: &str = "ticket:approve";
pub const PROCESS: &str = "ticket:process";
pub const CLOSE: &str = "ticket:close";
pub const ADMIN: &str = "ticket:admin";
pub const STATUS: &str = "ticket:status";
pub const VIEW_ALL: &str = "ticket:view_all";

/// Answers "does this user hold this permission".
///
/// Implementations that can fail must deny on failure.
pub trait PermissionProvider: Send + Sync {
    fn has_permission(&self, user: UserId, permission: &str) -> bool;
}

impl<P: PermissionProvider + ?Sized> PermissionProvider for Arc<P> {
    fn has_permission(&self, user: UserId, permission: &str) -> bool {
        (**self).has_permission(user, permission)
    }
}

/// Fixed in-memory grants.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    grants: HashMap<UserId, BTreeSet<String>>,
}

impl StaticPermissions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_grant(mut self, user: UserId, permission: &str) -> Self {
        self.grant(user, permission);
        self
    }

    pub fn grant(&mut self, user: UserId, permission: &str) {
        self.grants
            .entry(user)
            .or_default()
            .insert(permission.to_string());
    }

    pub fn revoke(&mut self, user: UserId, permission: &str) -> bool {
        self.grants
            .get_mut(&user)
            .is_some_and(|held| held.remove(permission))
    }
}

impl PermissionProvider for StaticPermissions {
    fn has_permission(&self, user: UserId, permission: &str) -> bool {
        self.grants
            .get(&user)
            .is_some_and(|held| held.contains(permission))
    }
}
