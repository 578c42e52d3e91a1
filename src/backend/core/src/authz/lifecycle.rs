//! Keeping authorization entries in step with the resources they protect.
//!
//! A lifecycle provider turns domain events (a resource was created, a task
//! changed hands, a resource was deleted) into [`EntryMutation`]s. The caller
//! stages them in the same [`Transaction`](super::store::Transaction) as the
//! business change, so both commit or neither does.
//!
//! Providers are pure: they receive the entries that currently exist for the
//! affected resource and never touch the store themselves.
//!
//! Customisation is by composition. A [`LifecycleExtension`] sees the
//! mutations the wrapped provider produced and may add to them; it cannot
//! take anything away unless it chooses to.

use std::fmt;

use super::disabled::TaskAssigneePermission;
use super::entry::{AuthorizationEntry, AuthorizationKind, Principal, ResourceScope};
use super::permissions::{
    HistoricTaskPermissions, Permissions, TaskPermissions, ALL_BITS, NONE_BITS,
};
use super::resources::{ResourceType, Resources};
use super::store::EntryMutation;

// ═══════════════════════════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════════════════════════

/// A concrete resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub resource_type: ResourceType,
    pub resource_id: String,
}

impl ResourceRef {
    pub fn new(resource_type: ResourceType, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type,
            resource_id: resource_id.into(),
        }
    }
}

/// Relationship between a principal and a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LinkType {
    Assignee,
    Owner,
    Candidate,
    Member,
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCreated {
    pub resource: ResourceRef,
    /// The principal that created, or initially owns, the resource.
    pub principal: Option<Principal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalChange {
    pub resource: ResourceRef,
    pub link_type: LinkType,
    pub old: Option<Principal>,
    pub new: Option<Principal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityLink {
    pub resource: ResourceRef,
    pub principal: Principal,
    pub link_type: LinkType,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Provider Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Produces entry mutations for resource lifecycle events.
///
/// `existing` holds the entries currently stored for the affected resource
/// id, across all resource types.
pub trait AuthorizationLifecycleProvider: Send + Sync + fmt::Debug {
    fn resource_created(&self, event: &ResourceCreated) -> Vec<EntryMutation>;

    fn principal_changed(
        &self,
        event: &PrincipalChange,
        existing: &[AuthorizationEntry],
    ) -> Vec<EntryMutation>;

    fn identity_link_added(
        &self,
        link: &IdentityLink,
        existing: &[AuthorizationEntry],
    ) -> Vec<EntryMutation>;

    fn identity_link_removed(
        &self,
        link: &IdentityLink,
        existing: &[AuthorizationEntry],
    ) -> Vec<EntryMutation>;

    fn resource_deleted(&self, resource: &ResourceRef) -> Vec<EntryMutation>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Default Provider
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine settings the default provider depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleSettings {
    pub task_assignee_permission: TaskAssigneePermission,
    pub enforce_specific_variable_permission: bool,
    pub enable_historic_instance_permissions: bool,
}

/// Default entry bookkeeping.
///
/// - creation grants the creator `ALL` (groups get `READ`, deployments
///   `READ | DELETE`);
/// - task assignees, owners and candidates get `READ` plus the configured
///   task assignee permission, and read access to the historic task when
///   historic permissions are enabled;
/// - tenant members get `READ` on the tenant;
/// - a principal change moves those bits from the old principal's entry to
///   the new one, deleting the old entry once it is empty;
/// - deletion removes every entry scoped to the deleted instance.
#[derive(Debug, Clone, Default)]
pub struct DefaultLifecycleProvider {
    settings: LifecycleSettings,
}

impl DefaultLifecycleProvider {
    pub fn new(settings: LifecycleSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Bits granted to whoever creates a resource of `resource_type`.
    pub fn creation_bits(&self, resource_type: ResourceType) -> u32 {
        match resource_type {
            t if t == Resources::GROUP => Permissions::READ.bits(),
            t if t == Resources::DEPLOYMENT => Permissions::READ.bits() | Permissions::DELETE.bits(),
            _ => ALL_BITS,
        }
    }

    /// Bits a linked principal holds on a task.
    pub fn task_bits(&self) -> u32 {
        let mut bits = Permissions::READ.bits() | self.settings.task_assignee_permission.permission().bits();
        if self.settings.enforce_specific_variable_permission {
            bits |= TaskPermissions::READ_VARIABLE.bits();
        }
        bits
    }

    /// Bits a linked principal holds on a historic task.
    pub fn historic_task_bits(&self) -> u32 {
        let mut bits = HistoricTaskPermissions::READ.bits();
        if self.settings.enforce_specific_variable_permission {
            bits |= HistoricTaskPermissions::READ_VARIABLE.bits();
        }
        bits
    }

    /// Resources and bits that follow a linked principal.
    fn link_targets(&self, resource: &ResourceRef) -> Vec<(ResourceRef, u32)> {
        let t = resource.resource_type;
        if t == Resources::TASK {
            let mut targets = vec![(resource.clone(), self.task_bits())];
            if self.settings.enable_historic_instance_permissions {
                targets.push((
                    ResourceRef::new(Resources::HISTORIC_TASK, resource.resource_id.clone()),
                    self.historic_task_bits(),
                ));
            }
            targets
        } else if t == Resources::TENANT {
            vec![(resource.clone(), Permissions::READ.bits())]
        } else {
            vec![(resource.clone(), self.creation_bits(t))]
        }
    }
}

impl AuthorizationLifecycleProvider for DefaultLifecycleProvider {
    fn resource_created(&self, event: &ResourceCreated) -> Vec<EntryMutation> {
        let Some(principal) = &event.principal else {
            return Vec::new();
        };
        let mut mutations = Vec::new();
        let bits = self.creation_bits(event.resource.resource_type);
        grant_bits(&mut mutations, &[], principal, &event.resource, bits);
        mutations
    }

    fn principal_changed(
        &self,
        event: &PrincipalChange,
        existing: &[AuthorizationEntry],
    ) -> Vec<EntryMutation> {
        if event.old == event.new {
            return Vec::new();
        }
        let mut mutations = Vec::new();
        for (target, bits) in self.link_targets(&event.resource) {
            if let Some(old) = &event.old {
                withdraw_bits(&mut mutations, existing, old, &target, bits);
            }
            if let Some(new) = &event.new {
                grant_bits(&mut mutations, existing, new, &target, bits);
            }
        }
        mutations
    }

    fn identity_link_added(
        &self,
        link: &IdentityLink,
        existing: &[AuthorizationEntry],
    ) -> Vec<EntryMutation> {
        let mut mutations = Vec::new();
        for (target, bits) in self.link_targets(&link.resource) {
            grant_bits(&mut mutations, existing, &link.principal, &target, bits);
        }
        mutations
    }

    fn identity_link_removed(
        &self,
        _link: &IdentityLink,
        _existing: &[AuthorizationEntry],
    ) -> Vec<EntryMutation> {
        Vec::new()
    }

    fn resource_deleted(&self, resource: &ResourceRef) -> Vec<EntryMutation> {
        vec![EntryMutation::DeleteForResource {
            resource_type: resource.resource_type,
            resource_id: resource.resource_id.clone(),
            principal: None,
        }]
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Composition
// ═══════════════════════════════════════════════════════════════════════════════

/// Adds to the mutations of a wrapped provider. Every hook defaults to
/// leaving them unchanged.
pub trait LifecycleExtension: Send + Sync + fmt::Debug {
    fn resource_created(&self, _event: &ResourceCreated, _mutations: &mut Vec<EntryMutation>) {}

    fn principal_changed(
        &self,
        _event: &PrincipalChange,
        _existing: &[AuthorizationEntry],
        _mutations: &mut Vec<EntryMutation>,
    ) {
    }

    fn identity_link_added(
        &self,
        _link: &IdentityLink,
        _existing: &[AuthorizationEntry],
        _mutations: &mut Vec<EntryMutation>,
    ) {
    }

    fn identity_link_removed(
        &self,
        _link: &IdentityLink,
        _existing: &[AuthorizationEntry],
        _mutations: &mut Vec<EntryMutation>,
    ) {
    }

    fn resource_deleted(&self, _resource: &ResourceRef, _mutations: &mut Vec<EntryMutation>) {}
}

/// A provider followed by an extension.
#[derive(Debug, Clone)]
pub struct ExtendedLifecycleProvider<P, E> {
    base: P,
    extension: E,
}

impl<P, E> ExtendedLifecycleProvider<P, E>
where
    P: AuthorizationLifecycleProvider,
    E: LifecycleExtension,
{
    pub fn new(base: P, extension: E) -> Self {
        Self { base, extension }
    }

    pub fn base(&self) -> &P {
        &self.base
    }
}

impl<P, E> AuthorizationLifecycleProvider for ExtendedLifecycleProvider<P, E>
where
    P: AuthorizationLifecycleProvider,
    E: LifecycleExtension,
{
    fn resource_created(&self, event: &ResourceCreated) -> Vec<EntryMutation> {
        let mut mutations = self.base.resource_created(event);
        self.extension.resource_created(event, &mut mutations);
        mutations
    }

    fn principal_changed(
        &self,
        event: &PrincipalChange,
        existing: &[AuthorizationEntry],
    ) -> Vec<EntryMutation> {
        let mut mutations = self.base.principal_changed(event, existing);
        self.extension.principal_changed(event, existing, &mut mutations);
        mutations
    }

    fn identity_link_added(
        &self,
        link: &IdentityLink,
        existing: &[AuthorizationEntry],
    ) -> Vec<EntryMutation> {
        let mut mutations = self.base.identity_link_added(link, existing);
        self.extension.identity_link_added(link, existing, &mut mutations);
        mutations
    }

    fn identity_link_removed(
        &self,
        link: &IdentityLink,
        existing: &[AuthorizationEntry],
    ) -> Vec<EntryMutation> {
        let mut mutations = self.base.identity_link_removed(link, existing);
        self.extension.identity_link_removed(link, existing, &mut mutations);
        mutations
    }

    fn resource_deleted(&self, resource: &ResourceRef) -> Vec<EntryMutation> {
        let mut mutations = self.base.resource_deleted(resource);
        self.extension.resource_deleted(resource, &mut mutations);
        mutations
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Mutation Helpers
// ═══════════════════════════════════════════════════════════════════════════════

fn is_default_entry(entry: &AuthorizationEntry, principal: &Principal, target: &ResourceRef) -> bool {
    entry.kind() == AuthorizationKind::Grant
        && entry.principal() == Some(principal)
        && entry.resource_type() == target.resource_type
        && matches!(entry.scope(), ResourceScope::Instance(id) if *id == target.resource_id)
}

fn union(a: u32, b: u32) -> u32 {
    if a == ALL_BITS || b == ALL_BITS {
        ALL_BITS
    } else {
        a | b
    }
}

/// Current bits of `id` after the mutations already planned.
fn planned_bits(mutations: &[EntryMutation], id: uuid::Uuid, stored: u32) -> Option<u32> {
    let mut bits = Some(stored);
    for mutation in mutations {
        match mutation {
            EntryMutation::UpdateBits { id: target, bits: new } if *target == id => bits = Some(*new),
            EntryMutation::Delete(target) if *target == id => bits = None,
            _ => {}
        }
    }
    bits
}

/// Give `principal` the `bits` on `target`: widen a planned create, widen the
/// existing grant entry, or plan a new one.
///
/// Extensions use this to layer extra permissions on top of the defaults.
pub fn grant_bits(
    mutations: &mut Vec<EntryMutation>,
    existing: &[AuthorizationEntry],
    principal: &Principal,
    target: &ResourceRef,
    bits: u32,
) {
    if bits == NONE_BITS {
        return;
    }

    for mutation in mutations.iter_mut() {
        if let EntryMutation::Create(entry) = mutation {
            if is_default_entry(entry, principal, target) {
                let widened = union(entry.bits(), bits);
                entry.set_bits(widened);
                return;
            }
        }
    }

    if let Some(entry) = existing.iter().find(|e| is_default_entry(e, principal, target)) {
        if let Some(current) = planned_bits(mutations, entry.id(), entry.bits()) {
            let widened = union(current, bits);
            if widened != current {
                mutations.push(EntryMutation::UpdateBits {
                    id: entry.id(),
                    bits: widened,
                });
            }
            return;
        }
    }

    mutations.push(EntryMutation::Create(
        AuthorizationEntry::grant(
            principal.clone(),
            target.resource_type,
            ResourceScope::Instance(target.resource_id.clone()),
        )
        .with_bits(bits),
    ));
}

/// Take `bits` away from `principal`'s grant entry on `target`, deleting the
/// entry when nothing is left.
pub fn withdraw_bits(
    mutations: &mut Vec<EntryMutation>,
    existing: &[AuthorizationEntry],
    principal: &Principal,
    target: &ResourceRef,
    bits: u32,
) {
    let Some(entry) = existing.iter().find(|e| is_default_entry(e, principal, target)) else {
        return;
    };
    let Some(current) = planned_bits(mutations, entry.id(), entry.bits()) else {
        return;
    };
    let remaining = if bits == ALL_BITS { NONE_BITS } else { current & !bits };
    if remaining == NONE_BITS {
        mutations.push(EntryMutation::Delete(entry.id()));
    } else if remaining != current {
        mutations.push(EntryMutation::UpdateBits {
            id: entry.id(),
            bits: remaining,
        });
    }
}
