//! The identity a check runs under, and scoped control of enforcement.

use std::cell::Cell;
use std::fmt;

/// Authenticated user, their groups and the enforcement flag.
///
/// A context without a user id is the unrestricted system context: every
/// check passes. A context without groups only considers user and global
/// entries; it never means "all groups".
///
/// The enforcement flag is request-local state. It can only be changed
/// through [`override_enforcement`](Self::override_enforcement), which hands
/// back a guard restoring the previous value when dropped, including while
/// unwinding from a panic. The context is intentionally `!Sync`.
pub struct IdentityContext {
    user_id: Option<String>,
    group_ids: Option<Vec<String>>,
    enforcement: Cell<bool>,
}

impl IdentityContext {
    /// Context for an authenticated user with enforcement enabled.
    pub fn new(user_id: impl Into<String>, group_ids: Option<Vec<String>>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            group_ids,
            enforcement: Cell::new(true),
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self::new(user_id, None)
    }

    /// The unrestricted system context.
    pub fn system() -> Self {
        Self {
            user_id: None,
            group_ids: None,
            enforcement: Cell::new(true),
        }
    }

    pub fn with_groups(mut self, group_ids: Vec<String>) -> Self {
        self.group_ids = Some(group_ids);
        self
    }

    pub fn with_enforcement(self, enabled: bool) -> Self {
        self.enforcement.set(enabled);
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn group_ids(&self) -> Option<&[String]> {
        self.group_ids.as_deref()
    }

    /// Groups considered by a check: the configured list, or none at all.
    pub fn effective_groups(&self) -> Vec<String> {
        self.group_ids.clone().unwrap_or_default()
    }

    pub fn is_system(&self) -> bool {
        self.user_id.is_none()
    }

    pub fn is_enforced(&self) -> bool {
        self.enforcement.get()
    }

    /// Set the enforcement flag until the returned guard is dropped.
    #[must_use = "enforcement is restored as soon as the guard is dropped"]
    pub fn override_enforcement(&self, enabled: bool) -> EnforcementGuard<'_> {
        let previous = self.enforcement.replace(enabled);
        EnforcementGuard {
            flag: &self.enforcement,
            previous,
        }
    }

    /// Run `f` with enforcement switched off, restoring it afterwards.
    pub fn without_enforcement<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.override_enforcement(false);
        f()
    }

    /// Run `f` with enforcement switched on, restoring it afterwards.
    pub fn with_enforcement_enabled<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.override_enforcement(true);
        f()
    }
}

impl Clone for IdentityContext {
    fn clone(&self) -> Self {
        Self {
            user_id: self.user_id.clone(),
            group_ids: self.group_ids.clone(),
            enforcement: Cell::new(self.enforcement.get()),
        }
    }
}

impl fmt::Debug for IdentityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityContext")
            .field("user_id", &self.user_id)
            .field("group_ids", &self.group_ids)
            .field("enforcement", &self.enforcement.get())
            .finish()
    }
}

/// Restores the enforcement flag it replaced.
#[derive(Debug)]
pub struct EnforcementGuard<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl EnforcementGuard<'_> {
    /// The value that will be restored.
    pub fn previous(&self) -> bool {
        self.previous
    }
}

impl Drop for EnforcementGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_guard_restores_on_drop() {
        let ctx = IdentityContext::user("demo");
        {
            let guard = ctx.override_enforcement(false);
            assert!(guard.previous());
            assert!(!ctx.is_enforced());
        }
        assert!(ctx.is_enforced());
    }

    #[test]
    fn test_nested_overrides_unwind_in_order() {
        let ctx = IdentityContext::user("demo");
        let outer = ctx.override_enforcement(false);
        {
            let _inner = ctx.override_enforcement(true);
            assert!(ctx.is_enforced());
        }
        assert!(!ctx.is_enforced());
        drop(outer);
        assert!(ctx.is_enforced());
    }

    #[test]
    fn test_guard_restores_on_panic() {
        let ctx = IdentityContext::user("demo");
        let result = catch_unwind(AssertUnwindSafe(|| {
            ctx.without_enforcement(|| {
                assert!(!ctx.is_enforced());
                panic!("boom");
            })
        }));
        assert!(result.is_err());
        assert!(ctx.is_enforced());
    }

    #[test]
    fn test_null_groups_mean_no_groups() {
        let ctx = IdentityContext::user("demo");
        assert!(ctx.group_ids().is_none());
        assert!(ctx.effective_groups().is_empty());
    }

    #[test]
    fn test_system_context() {
        let ctx = IdentityContext::system();
        assert!(ctx.is_system());
        assert_eq!(ctx.user_id(), None);
    }
}
