//! Permissions and the per-resource-type permission registry.
//!
//! A [`Permission`] is a named capability bit. Permissions of different
//! resource types may share a bit value (process definition `RETRY_JOB` and
//! application `ACCESS` are both `32`), and two permissions with the same bit
//! value are treated as the same permission wherever identity matters, most
//! notably when permissions are disabled engine-wide.

use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::debug;

use super::errors::AuthzError;
use super::resources::{ResourceType, Resources};

/// Bit pattern stored on entries that hold every permission of their type.
pub const ALL_BITS: u32 = u32::MAX;

/// Bit pattern of the empty permission set.
pub const NONE_BITS: u32 = 0;

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// A named permission bit.
///
/// Equality and hashing only look at the bit value. `ACCESS` and `RETRY_JOB`
/// compare equal because both are `32`.
#[derive(Debug, Clone, Copy, Eq)]
pub struct Permission {
    name: &'static str,
    bits: u32,
}

impl Permission {
    pub const fn new(name: &'static str, bits: u32) -> Self {
        Self { name, bits }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn bits(&self) -> u32 {
        self.bits
    }

    pub const fn is_all(&self) -> bool {
        self.bits == ALL_BITS
    }

    pub const fn is_none(&self) -> bool {
        self.bits == NONE_BITS
    }

    /// Whether the bit value is usable: one set bit or a sentinel.
    pub const fn is_well_formed(&self) -> bool {
        self.is_all() || self.is_none() || self.bits.is_power_of_two()
    }
}

impl PartialEq for Permission {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl Hash for Permission {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Built-in Permissions
// ═══════════════════════════════════════════════════════════════════════════════

/// Permissions shared by most resource types.
pub struct Permissions;

impl Permissions {
    pub const NONE: Permission = Permission::new("NONE", NONE_BITS);
    pub const ALL: Permission = Permission::new("ALL", ALL_BITS);
    pub const READ: Permission = Permission::new("READ", 2);
    pub const UPDATE: Permission = Permission::new("UPDATE", 4);
    pub const CREATE: Permission = Permission::new("CREATE", 8);
    pub const DELETE: Permission = Permission::new("DELETE", 16);
    pub const ACCESS: Permission = Permission::new("ACCESS", 32);
    pub const READ_TASK: Permission = Permission::new("READ_TASK", 64);
    pub const UPDATE_TASK: Permission = Permission::new("UPDATE_TASK", 128);
    pub const CREATE_INSTANCE: Permission = Permission::new("CREATE_INSTANCE", 256);
    pub const READ_INSTANCE: Permission = Permission::new("READ_INSTANCE", 512);
    pub const UPDATE_INSTANCE: Permission = Permission::new("UPDATE_INSTANCE", 1024);
    pub const DELETE_INSTANCE: Permission = Permission::new("DELETE_INSTANCE", 2048);
    pub const READ_HISTORY: Permission = Permission::new("READ_HISTORY", 4096);
    pub const DELETE_HISTORY: Permission = Permission::new("DELETE_HISTORY", 8192);
    pub const TASK_WORK: Permission = Permission::new("TASK_WORK", 16384);
    pub const TASK_ASSIGN: Permission = Permission::new("TASK_ASSIGN", 32768);
    pub const MIGRATE_INSTANCE: Permission = Permission::new("MIGRATE_INSTANCE", 65536);
}

/// Permissions specific to process definitions.
pub struct ProcessDefinitionPermissions;

impl ProcessDefinitionPermissions {
    pub const RETRY_JOB: Permission = Permission::new("RETRY_JOB", 32);
    pub const SUSPEND: Permission = Permission::new("SUSPEND", 262_144);
    pub const SUSPEND_INSTANCE: Permission = Permission::new("SUSPEND_INSTANCE", 524_288);
    pub const UPDATE_INSTANCE_VARIABLE: Permission =
        Permission::new("UPDATE_INSTANCE_VARIABLE", 1_048_576);
    pub const UPDATE_TASK_VARIABLE: Permission =
        Permission::new("UPDATE_TASK_VARIABLE", 2_097_152);
    pub const READ_INSTANCE_VARIABLE: Permission =
        Permission::new("READ_INSTANCE_VARIABLE", 4_194_304);
    pub const READ_HISTORY_VARIABLE: Permission =
        Permission::new("READ_HISTORY_VARIABLE", 8_388_608);
    pub const READ_TASK_VARIABLE: Permission = Permission::new("READ_TASK_VARIABLE", 16_777_216);
    pub const UPDATE_HISTORY: Permission = Permission::new("UPDATE_HISTORY", 33_554_432);
}

/// Permissions specific to process instances.
pub struct ProcessInstancePermissions;

impl ProcessInstancePermissions {
    pub const RETRY_JOB: Permission = Permission::new("RETRY_JOB", 32);
    pub const SUSPEND: Permission = Permission::new("SUSPEND", 64);
    pub const UPDATE_VARIABLE: Permission = Permission::new("UPDATE_VARIABLE", 128);
}

/// Permissions specific to tasks.
pub struct TaskPermissions;

impl TaskPermissions {
    pub const UPDATE_VARIABLE: Permission = Permission::new("UPDATE_VARIABLE", 32);
    pub const READ_VARIABLE: Permission = Permission::new("READ_VARIABLE", 64);
}

/// Permissions of the read-only historic task resource.
pub struct HistoricTaskPermissions;

impl HistoricTaskPermissions {
    pub const READ: Permission = Permission::new("READ", 2);
    pub const READ_VARIABLE: Permission = Permission::new("READ_VARIABLE", 4);
}

/// Permissions of the read-only historic process instance resource.
pub struct HistoricProcessInstancePermissions;

impl HistoricProcessInstancePermissions {
    pub const READ: Permission = Permission::new("READ", 2);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-resource-type catalogue of permission bits.
///
/// `ALL` and `NONE` are implicit members of every registered type and are
/// never stored. A type's `ALL` mask is the union of the bits registered for
/// it.
#[derive(Debug, Clone, Default)]
pub struct PermissionRegistry {
    resource_types: HashMap<u32, ResourceType>,
    permissions: HashMap<u32, Vec<Permission>>,
    // Registration order across all types, for name lookups.
    ordered: Vec<Permission>,
}

impl PermissionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in resource types and permissions.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (resource_type, permissions) in builtin_catalogue() {
            registry.register_resource_type(resource_type);
            for permission in permissions {
                // The built-in catalogue has no same-type collisions.
                if let Err(e) = registry.register(resource_type, permission) {
                    debug!(error = %e, "Skipping built-in permission");
                }
            }
        }
        registry
    }

    /// Make a resource type known without registering any permissions for it.
    pub fn register_resource_type(&mut self, resource_type: ResourceType) {
        self.resource_types.insert(resource_type.id(), resource_type);
        self.permissions.entry(resource_type.id()).or_default();
    }

    /// Register `permission` for `resource_type`.
    ///
    /// Registering the same name and bit twice is a no-op. Reusing a bit under
    /// another name, or a name under another bit, within one type is a
    /// configuration error. The same bit on a different type is allowed.
    pub fn register(
        &mut self,
        resource_type: ResourceType,
        permission: Permission,
    ) -> Result<(), AuthzError> {
        if !permission.is_well_formed() {
            return Err(AuthzError::Configuration(format!(
                "Permission '{}' has bit value {} which is neither a single bit nor a sentinel",
                permission.name(),
                permission.bits()
            )));
        }

        self.register_resource_type(resource_type);

        if permission.is_all() || permission.is_none() {
            return Ok(());
        }

        let registered = self.permissions.entry(resource_type.id()).or_default();
        for existing in registered.iter() {
            let same_bits = existing.bits() == permission.bits();
            let same_name = existing.name() == permission.name();
            match (same_bits, same_name) {
                (true, true) => return Ok(()),
                (true, false) => {
                    return Err(AuthzError::Configuration(format!(
                        "Permission '{}' collides with '{}' on resource type '{}' (bit value {})",
                        permission.name(),
                        existing.name(),
                        resource_type,
                        permission.bits()
                    )))
                }
                (false, true) => {
                    return Err(AuthzError::Configuration(format!(
                        "Permission '{}' is already registered on resource type '{}' with bit value {}",
                        permission.name(),
                        resource_type,
                        existing.bits()
                    )))
                }
                (false, false) => {}
            }
        }

        registered.push(permission);
        self.ordered.push(permission);
        debug!(
            resource_type = %resource_type,
            permission = permission.name(),
            bits = permission.bits(),
            "Registered permission"
        );
        Ok(())
    }

    /// Resolve a permission name within one resource type.
    pub fn resolve(
        &self,
        resource_type: ResourceType,
        name: &str,
    ) -> Result<Permission, AuthzError> {
        if let Some(sentinel) = sentinel_by_name(name) {
            if self.resource_types.contains_key(&resource_type.id()) {
                return Ok(sentinel);
            }
        }

        self.permissions
            .get(&resource_type.id())
            .and_then(|perms| perms.iter().find(|p| p.name() == name))
            .copied()
            .ok_or_else(|| AuthzError::UnknownPermission {
                resource_type: resource_type.name().to_string(),
                name: name.to_string(),
            })
    }

    /// Every distinct bit registered under `name` on any type, in
    /// registration order. Empty when the name is unknown.
    pub fn resolve_all_by_name(&self, name: &str) -> Vec<Permission> {
        if let Some(sentinel) = sentinel_by_name(name) {
            return vec![sentinel];
        }
        let mut found: Vec<Permission> = Vec::new();
        for permission in self.ordered.iter().filter(|p| p.name() == name) {
            if !found.iter().any(|f| f.bits() == permission.bits()) {
                found.push(*permission);
            }
        }
        found
    }

    /// Union of every bit registered for `resource_type`.
    pub fn all_mask(&self, resource_type: ResourceType) -> u32 {
        self.permissions
            .get(&resource_type.id())
            .map(|perms| perms.iter().fold(NONE_BITS, |acc, p| acc | p.bits()))
            .unwrap_or(NONE_BITS)
    }

    /// Permissions registered for `resource_type`, in registration order.
    pub fn permissions_for(&self, resource_type: ResourceType) -> &[Permission] {
        self.permissions
            .get(&resource_type.id())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `permission` may be checked against `resource_type`.
    ///
    /// Matches on name and bit. A permission of another type whose bit
    /// happens to be registered here under a different name is not valid.
    pub fn is_valid_for(&self, resource_type: ResourceType, permission: Permission) -> bool {
        if !self.resource_types.contains_key(&resource_type.id()) {
            return false;
        }
        permission.is_all()
            || permission.is_none()
            || self
                .permissions_for(resource_type)
                .iter()
                .any(|p| p.name() == permission.name() && p.bits() == permission.bits())
    }

    /// Whether every bit in `bits` is registered for `resource_type`.
    pub fn is_mask_valid_for(&self, resource_type: ResourceType, bits: u32) -> bool {
        bits == ALL_BITS || bits & !self.all_mask(resource_type) == 0
    }

    /// Decode a stored mask into the named permissions it carries.
    pub fn decode(&self, resource_type: ResourceType, bits: u32) -> Vec<Permission> {
        if bits == NONE_BITS {
            return vec![Permissions::NONE];
        }
        let all = self.all_mask(resource_type);
        if bits == ALL_BITS || (all != NONE_BITS && bits & all == all) {
            return vec![Permissions::ALL];
        }
        self.permissions_for(resource_type)
            .iter()
            .filter(|p| bits & p.bits() == p.bits())
            .copied()
            .collect()
    }

    pub fn resource_types(&self) -> Vec<ResourceType> {
        let mut types: Vec<ResourceType> = self.resource_types.values().copied().collect();
        types.sort();
        types
    }

    pub fn resource_type(&self, id: u32) -> Option<ResourceType> {
        self.resource_types.get(&id).copied()
    }
}

fn sentinel_by_name(name: &str) -> Option<Permission> {
    match name {
        "ALL" => Some(Permissions::ALL),
        "NONE" => Some(Permissions::NONE),
        _ => None,
    }
}

fn builtin_catalogue() -> Vec<(ResourceType, Vec<Permission>)> {
    use Permissions as P;
    use ProcessDefinitionPermissions as Def;
    use ProcessInstancePermissions as Inst;

    let crud = vec![P::READ, P::UPDATE, P::CREATE, P::DELETE];

    vec![
        (Resources::APPLICATION, vec![P::ACCESS]),
        (Resources::USER, crud.clone()),
        (Resources::GROUP, crud.clone()),
        (Resources::GROUP_MEMBERSHIP, vec![P::CREATE, P::DELETE]),
        (Resources::AUTHORIZATION, crud.clone()),
        (Resources::FILTER, crud.clone()),
        (
            Resources::PROCESS_DEFINITION,
            vec![
                P::READ,
                P::UPDATE,
                P::DELETE,
                P::READ_TASK,
                P::UPDATE_TASK,
                P::CREATE_INSTANCE,
                P::READ_INSTANCE,
                P::UPDATE_INSTANCE,
                P::DELETE_INSTANCE,
                P::READ_HISTORY,
                P::DELETE_HISTORY,
                P::TASK_WORK,
                P::TASK_ASSIGN,
                P::MIGRATE_INSTANCE,
                Def::RETRY_JOB,
                Def::SUSPEND,
                Def::SUSPEND_INSTANCE,
                Def::UPDATE_INSTANCE_VARIABLE,
                Def::UPDATE_TASK_VARIABLE,
                Def::READ_INSTANCE_VARIABLE,
                Def::READ_HISTORY_VARIABLE,
                Def::READ_TASK_VARIABLE,
                Def::UPDATE_HISTORY,
            ],
        ),
        (
            Resources::TASK,
            vec![
                P::READ,
                P::UPDATE,
                P::CREATE,
                P::DELETE,
                P::TASK_WORK,
                P::TASK_ASSIGN,
                TaskPermissions::UPDATE_VARIABLE,
                TaskPermissions::READ_VARIABLE,
            ],
        ),
        (
            Resources::PROCESS_INSTANCE,
            vec![
                P::READ,
                P::UPDATE,
                P::CREATE,
                P::DELETE,
                Inst::RETRY_JOB,
                Inst::SUSPEND,
                Inst::UPDATE_VARIABLE,
            ],
        ),
        (Resources::DEPLOYMENT, vec![P::READ, P::CREATE, P::DELETE]),
        (
            Resources::DECISION_DEFINITION,
            vec![
                P::READ,
                P::UPDATE,
                P::CREATE_INSTANCE,
                P::READ_HISTORY,
                P::DELETE_HISTORY,
            ],
        ),
        (Resources::TENANT, crud.clone()),
        (Resources::TENANT_MEMBERSHIP, vec![P::CREATE, P::DELETE]),
        (
            Resources::BATCH,
            vec![
                P::READ,
                P::UPDATE,
                P::CREATE,
                P::DELETE,
                P::READ_HISTORY,
                P::DELETE_HISTORY,
            ],
        ),
        (Resources::DECISION_REQUIREMENTS_DEFINITION, vec![P::READ]),
        (
            Resources::HISTORIC_TASK,
            vec![
                HistoricTaskPermissions::READ,
                HistoricTaskPermissions::READ_VARIABLE,
            ],
        ),
        (
            Resources::HISTORIC_PROCESS_INSTANCE,
            vec![HistoricProcessInstancePermissions::READ],
        ),
        (Resources::SYSTEM, vec![P::READ, P::UPDATE, P::DELETE]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUSTOM: ResourceType = ResourceType::new(100, "Custom");

    #[test]
    fn test_permission_equality_is_by_bits() {
        assert_eq!(Permissions::ACCESS, ProcessDefinitionPermissions::RETRY_JOB);
        assert_ne!(Permissions::READ, Permissions::UPDATE);
    }

    #[test]
    fn test_all_mask_is_union_of_registered_bits() {
        let mut registry = PermissionRegistry::new();
        registry.register(CUSTOM, Permission::new("A", 1)).unwrap();
        registry.register(CUSTOM, Permission::new("B", 8)).unwrap();
        assert_eq!(registry.all_mask(CUSTOM), 9);
    }

    #[test]
    fn test_same_type_bit_collision_rejected() {
        let mut registry = PermissionRegistry::new();
        registry.register(CUSTOM, Permission::new("A", 2)).unwrap();
        let err = registry.register(CUSTOM, Permission::new("B", 2)).unwrap_err();
        assert!(matches!(err, AuthzError::Configuration(_)));
    }

    #[test]
    fn test_cross_type_bit_collision_allowed() {
        let registry = PermissionRegistry::with_defaults();
        let access = registry.resolve(Resources::APPLICATION, "ACCESS").unwrap();
        let retry = registry
            .resolve(Resources::PROCESS_DEFINITION, "RETRY_JOB")
            .unwrap();
        assert_eq!(access.bits(), retry.bits());
    }

    #[test]
    fn test_reregistering_identical_permission_is_noop() {
        let mut registry = PermissionRegistry::new();
        registry.register(CUSTOM, Permission::new("A", 4)).unwrap();
        registry.register(CUSTOM, Permission::new("A", 4)).unwrap();
        assert_eq!(registry.permissions_for(CUSTOM).len(), 1);
    }

    #[test]
    fn test_malformed_bits_rejected() {
        let mut registry = PermissionRegistry::new();
        assert!(registry.register(CUSTOM, Permission::new("AB", 6)).is_err());
    }

    #[test]
    fn test_resolve_unknown_permission() {
        let registry = PermissionRegistry::with_defaults();
        let err = registry
            .resolve(Resources::APPLICATION, "READ_INSTANCE")
            .unwrap_err();
        assert!(matches!(err, AuthzError::UnknownPermission { .. }));
    }

    #[test]
    fn test_sentinels_resolve_for_every_type() {
        let registry = PermissionRegistry::with_defaults();
        for resource_type in registry.resource_types() {
            assert!(registry.resolve(resource_type, "ALL").unwrap().is_all());
            assert!(registry.resolve(resource_type, "NONE").unwrap().is_none());
        }
    }

    #[test]
    fn test_resolve_all_by_name_spans_types() {
        let registry = PermissionRegistry::with_defaults();
        let bits: Vec<u32> = registry
            .resolve_all_by_name("SUSPEND")
            .iter()
            .map(|p| p.bits())
            .collect();
        assert_eq!(bits.len(), 2);
        assert!(bits.contains(&ProcessDefinitionPermissions::SUSPEND.bits()));
        assert!(bits.contains(&ProcessInstancePermissions::SUSPEND.bits()));

        let variable: Vec<u32> = registry
            .resolve_all_by_name("READ_VARIABLE")
            .iter()
            .map(|p| p.bits())
            .collect();
        assert!(variable.contains(&TaskPermissions::READ_VARIABLE.bits()));
        assert!(variable.contains(&HistoricTaskPermissions::READ_VARIABLE.bits()));

        assert!(registry.resolve_all_by_name("doesNotExist").is_empty());
        assert!(registry.resolve_all_by_name("ALL")[0].is_all());
    }

    #[test]
    fn test_colliding_bit_from_another_type_is_not_valid() {
        let registry = PermissionRegistry::with_defaults();
        // ACCESS shares bit 32 with the task's UPDATE_VARIABLE.
        assert!(!registry.is_valid_for(Resources::TASK, Permissions::ACCESS));
        assert!(registry.is_valid_for(Resources::TASK, TaskPermissions::UPDATE_VARIABLE));
        // SUSPEND on an instance is bit 64, the task's READ_VARIABLE.
        assert!(!registry.is_valid_for(Resources::TASK, ProcessInstancePermissions::SUSPEND));
    }

    #[test]
    fn test_decode_mask() {
        let registry = PermissionRegistry::with_defaults();
        let decoded = registry.decode(Resources::TASK, 2 | 4);
        assert_eq!(decoded, vec![Permissions::READ, Permissions::UPDATE]);
        assert_eq!(registry.decode(Resources::TASK, ALL_BITS), vec![Permissions::ALL]);
        assert_eq!(registry.decode(Resources::TASK, 0), vec![Permissions::NONE]);
    }

    #[test]
    fn test_validity_for_resource_type() {
        let registry = PermissionRegistry::with_defaults();
        assert!(registry.is_valid_for(Resources::TASK, TaskPermissions::READ_VARIABLE));
        assert!(!registry.is_valid_for(Resources::APPLICATION, Permissions::READ));
        assert!(registry.is_mask_valid_for(Resources::APPLICATION, 32));
        assert!(!registry.is_mask_valid_for(Resources::APPLICATION, 2));
    }
}
