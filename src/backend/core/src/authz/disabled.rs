//! Engine-wide permission bypass and the default task assignee permission.
//!
//! Both are resolved once while the engine is built. A name that cannot be
//! resolved fails construction instead of surfacing on the first check.

use std::collections::HashSet;
use std::fmt;

use super::errors::AuthzError;
use super::permissions::{Permission, PermissionRegistry, Permissions};

// ═══════════════════════════════════════════════════════════════════════════════
// Disabled Permissions
// ═══════════════════════════════════════════════════════════════════════════════

/// Permissions that every check treats as held.
///
/// A configured name disables every bit registered under that name on any
/// type. Membership is then decided by bit value, so disabling `READ` also
/// disables every permission of any resource type whose bit is `2`.
#[derive(Debug, Clone, Default)]
pub struct DisabledPermissions {
    permissions: HashSet<Permission>,
}

impl DisabledPermissions {
    pub fn none() -> Self {
        Self::default()
    }

    /// Resolve configured names through the registry.
    pub fn from_names<S: AsRef<str>>(
        names: &[S],
        registry: &PermissionRegistry,
    ) -> Result<Self, AuthzError> {
        let mut permissions = HashSet::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let resolved = registry.resolve_all_by_name(name);
            if resolved.is_empty() {
                return Err(invalid_permission(name));
            }
            permissions.extend(resolved);
        }
        Ok(Self { permissions })
    }

    pub fn is_disabled(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    /// Names of the disabled permissions, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.permissions.iter().map(|p| p.name()).collect();
        names.sort_unstable();
        names
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Task Assignee Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// Permission given to a task's assignee, owner and candidates on top of `READ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskAssigneePermission {
    #[default]
    Update,
    TaskWork,
}

impl TaskAssigneePermission {
    /// Parse the configured value. Only `UPDATE` and `TASK_WORK` are accepted.
    pub fn from_config(name: Option<&str>) -> Result<Self, AuthzError> {
        match name {
            None => Err(AuthzError::Configuration(
                "Default task assignee permission is null".to_string(),
            )),
            Some("UPDATE") => Ok(Self::Update),
            Some("TASK_WORK") => Ok(Self::TaskWork),
            Some(other) => Err(invalid_permission(other)),
        }
    }

    pub fn permission(&self) -> Permission {
        match self {
            Self::Update => Permissions::UPDATE,
            Self::TaskWork => Permissions::TASK_WORK,
        }
    }
}

impl fmt::Display for TaskAssigneePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.permission().name())
    }
}

fn invalid_permission(name: &str) -> AuthzError {
    AuthzError::Configuration(format!("Permission '{}' is invalid", name))
}
