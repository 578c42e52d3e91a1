//! Authorization entries: persisted grant, revoke and global records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use super::errors::AuthzError;
use super::permissions::{Permission, PermissionRegistry, ALL_BITS, NONE_BITS};
use super::resources::{ResourceType, ANY};

// ═══════════════════════════════════════════════════════════════════════════════
// Kind, Principal, Scope
// ═══════════════════════════════════════════════════════════════════════════════

/// How an entry contributes to the effective permission mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationKind {
    /// Applies to everyone; bits are added.
    Global,
    /// Applies to one user or group; bits are added.
    Grant,
    /// Applies to one user or group; bits are removed.
    Revoke,
}

impl fmt::Display for AuthorizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "GLOBAL"),
            Self::Grant => write!(f, "GRANT"),
            Self::Revoke => write!(f, "REVOKE"),
        }
    }
}

/// The user or group a grant or revoke entry belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Principal {
    User(String),
    Group(String),
}

impl Principal {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self::Group(id.into())
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User(id) => Some(id),
            Self::Group(_) => None,
        }
    }

    pub fn group_id(&self) -> Option<&str> {
        match self {
            Self::Group(id) => Some(id),
            Self::User(_) => None,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user '{}'", id),
            Self::Group(id) => write!(f, "group '{}'", id),
        }
    }
}

/// Which resources of the entry's type an entry covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "scope", content = "resource_id", rename_all = "lowercase")]
pub enum ResourceScope {
    /// One concrete resource instance.
    Instance(String),
    /// Every instance (the `*` wildcard).
    Any,
    /// The resource type itself, for resources without instance ids.
    Unscoped,
}

impl ResourceScope {
    pub fn instance(id: impl Into<String>) -> Self {
        let id = id.into();
        if id == ANY {
            Self::Any
        } else {
            Self::Instance(id)
        }
    }

    /// The stored resource id: the concrete id, `*`, or nothing.
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Self::Instance(id) => Some(id),
            Self::Any => Some(ANY),
            Self::Unscoped => None,
        }
    }

    /// Whether an entry with this scope contributes to a check on `resource_id`.
    ///
    /// Wildcard and unscoped entries apply to every check of their type;
    /// instance entries only to the exact id.
    pub fn applies_to(&self, resource_id: Option<&str>) -> bool {
        match self {
            Self::Instance(id) => resource_id == Some(id.as_str()),
            Self::Any | Self::Unscoped => true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authorization Entry
// ═══════════════════════════════════════════════════════════════════════════════

/// A persisted authorization record.
///
/// Global entries never carry a principal; grant and revoke entries always
/// carry exactly one. The constructors enforce this and the fields are not
/// public. Revoke entries store the revoked bits, not their complement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationEntry {
    id: Uuid,
    kind: AuthorizationKind,
    principal: Option<Principal>,
    resource_type: ResourceType,
    scope: ResourceScope,
    permissions: u32,
    created_at: DateTime<Utc>,
}

impl AuthorizationEntry {
    fn new(
        kind: AuthorizationKind,
        principal: Option<Principal>,
        resource_type: ResourceType,
        scope: ResourceScope,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            principal,
            resource_type,
            scope,
            permissions: NONE_BITS,
            created_at: Utc::now(),
        }
    }

    /// A global entry applying to every user.
    pub fn global(resource_type: ResourceType, scope: ResourceScope) -> Self {
        Self::new(AuthorizationKind::Global, None, resource_type, scope)
    }

    pub fn grant(principal: Principal, resource_type: ResourceType, scope: ResourceScope) -> Self {
        Self::new(AuthorizationKind::Grant, Some(principal), resource_type, scope)
    }

    pub fn revoke(principal: Principal, resource_type: ResourceType, scope: ResourceScope) -> Self {
        Self::new(AuthorizationKind::Revoke, Some(principal), resource_type, scope)
    }

    /// Replace the permission mask, builder style.
    pub fn with_bits(mut self, bits: u32) -> Self {
        self.permissions = bits;
        self
    }

    /// Add one permission, builder style.
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.add_permission(permission);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> AuthorizationKind {
        self.kind
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.principal.as_ref().and_then(Principal::user_id)
    }

    pub fn group_id(&self) -> Option<&str> {
        self.principal.as_ref().and_then(Principal::group_id)
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn scope(&self) -> &ResourceScope {
        &self.scope
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.scope.resource_id()
    }

    pub fn bits(&self) -> u32 {
        self.permissions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether this entry adds bits (grant or global).
    pub fn is_additive(&self) -> bool {
        !matches!(self.kind, AuthorizationKind::Revoke)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permission bits
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_bits(&mut self, bits: u32) {
        self.permissions = bits;
    }

    pub fn add_permission(&mut self, permission: Permission) {
        if permission.is_all() {
            self.permissions = ALL_BITS;
        } else {
            self.permissions |= permission.bits();
        }
    }

    pub fn remove_permission(&mut self, permission: Permission) {
        if permission.is_all() {
            self.permissions = NONE_BITS;
        } else {
            self.permissions &= !permission.bits();
        }
    }

    fn carries(&self, permission: Permission) -> bool {
        if permission.is_all() {
            return self.permissions == ALL_BITS;
        }
        self.permissions & permission.bits() == permission.bits()
    }

    /// Whether this grant or global entry grants `permission`.
    pub fn is_permission_granted(&self, permission: Permission) -> bool {
        self.is_additive() && self.carries(permission)
    }

    /// Whether this revoke entry revokes `permission`.
    pub fn is_permission_revoked(&self, permission: Permission) -> bool {
        !self.is_additive() && self.carries(permission)
    }

    /// Decode the stored mask into named permissions of this entry's type.
    pub fn permissions(&self, registry: &PermissionRegistry) -> Vec<Permission> {
        registry.decode(self.resource_type, self.permissions)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    /// Check the entry against the registry before it is persisted.
    pub fn validate(&self, registry: &PermissionRegistry) -> Result<(), AuthzError> {
        match (&self.kind, &self.principal) {
            (AuthorizationKind::Global, Some(principal)) => {
                return Err(AuthzError::InvalidEntry(format!(
                    "global authorization cannot be bound to {}",
                    principal
                )))
            }
            (AuthorizationKind::Grant | AuthorizationKind::Revoke, None) => {
                return Err(AuthzError::InvalidEntry(format!(
                    "{} authorization requires a user or group",
                    self.kind
                )))
            }
            _ => {}
        }

        if let Some(principal) = &self.principal {
            let id = principal.user_id().or_else(|| principal.group_id()).unwrap_or("");
            if id.is_empty() {
                return Err(AuthzError::InvalidEntry(
                    "principal id must not be empty".to_string(),
                ));
            }
        }

        if let ResourceScope::Instance(id) = &self.scope {
            if id.is_empty() {
                return Err(AuthzError::InvalidEntry(
                    "resource id must not be empty".to_string(),
                ));
            }
        }

        if registry.resource_type(self.resource_type.id()).is_none() {
            return Err(AuthzError::InvalidEntry(format!(
                "resource type '{}' is not registered",
                self.resource_type
            )));
        }

        if !registry.is_mask_valid_for(self.resource_type, self.permissions) {
            let foreign = self.permissions & !registry.all_mask(self.resource_type);
            return Err(AuthzError::InvalidResourceForPermission {
                resource_type: self.resource_type.name().to_string(),
                permission: format!("bits {}", foreign),
            });
        }

        Ok(())
    }
}
