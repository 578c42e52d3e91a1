//! Storage contract for authorization entries.
//!
//! The store is a synchronous collaborator: the evaluator asks it for a
//! snapshot once per evaluation and never queries it again while composing
//! the decision. [`EntryFilter`] is the only matching rule in the crate. Point
//! checks, authorized list filtering and administrative queries all go
//! through it, so they cannot drift apart.
//!
//! Mutations are staged in a [`Transaction`] and handed to
//! [`AuthorizationStore::commit`] as one batch that either applies completely
//! or not at all.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, trace};
use uuid::Uuid;

pub use super::errors::StoreError;

use super::entry::{AuthorizationEntry, AuthorizationKind, Principal, ResourceScope};
use super::permissions::ALL_BITS;
use super::resources::ResourceType;

// ═══════════════════════════════════════════════════════════════════════════════
// Entry Filter
// ═══════════════════════════════════════════════════════════════════════════════

/// Restriction on the resource id of matching entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResourceIdFilter {
    /// Don't filter on resource id.
    #[default]
    Unfiltered,
    /// Entries that apply to a check on any of these ids: the exact id, the
    /// `ANY` wildcard, or unscoped entries. `None` stands for a type-level
    /// check without an instance id.
    Applicable(Vec<Option<String>>),
    /// Entries stored with exactly this scope.
    Exact(ResourceScope),
}

/// Restriction on the principal of matching entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PrincipalFilter {
    /// Don't filter on principal.
    #[default]
    Unfiltered,
    /// Entries that apply to this identity: global entries plus entries of the
    /// user or any of the groups.
    Applicable {
        user_id: String,
        group_ids: Vec<String>,
    },
    /// Entries bound to one of these users or one of these groups. Global
    /// entries never match.
    Members {
        user_ids: Vec<String>,
        group_ids: Vec<String>,
    },
}

/// The shared matching rule for authorization entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    ids: Option<Vec<Uuid>>,
    kind: Option<AuthorizationKind>,
    resource_types: Option<Vec<ResourceType>>,
    resource_ids: ResourceIdFilter,
    principals: PrincipalFilter,
    permission_bits: Option<u32>,
}

impl EntryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(mut self, ids: Vec<Uuid>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn kind(mut self, kind: AuthorizationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn resource_type(self, resource_type: ResourceType) -> Self {
        self.resource_types(vec![resource_type])
    }

    pub fn resource_types(mut self, mut resource_types: Vec<ResourceType>) -> Self {
        resource_types.sort();
        resource_types.dedup();
        self.resource_types = Some(resource_types);
        self
    }

    pub fn applicable_to(mut self, resource_ids: Vec<Option<String>>) -> Self {
        self.resource_ids = ResourceIdFilter::Applicable(resource_ids);
        self
    }

    pub fn scope(mut self, scope: ResourceScope) -> Self {
        self.resource_ids = ResourceIdFilter::Exact(scope);
        self
    }

    pub fn applicable_principals(mut self, user_id: impl Into<String>, group_ids: Vec<String>) -> Self {
        self.principals = PrincipalFilter::Applicable {
            user_id: user_id.into(),
            group_ids,
        };
        self
    }

    pub fn members(mut self, user_ids: Vec<String>, group_ids: Vec<String>) -> Self {
        self.principals = PrincipalFilter::Members { user_ids, group_ids };
        self
    }

    pub fn principal(self, principal: &Principal) -> Self {
        match principal {
            Principal::User(id) => self.members(vec![id.clone()], Vec::new()),
            Principal::Group(id) => self.members(Vec::new(), vec![id.clone()]),
        }
    }

    /// Only entries whose mask carries every bit in `bits`.
    pub fn has_bits(mut self, bits: u32) -> Self {
        self.permission_bits = Some(bits);
        self
    }

    pub fn matches(&self, entry: &AuthorizationEntry) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&entry.id()) {
                return false;
            }
        }

        if let Some(kind) = self.kind {
            if entry.kind() != kind {
                return false;
            }
        }

        if let Some(types) = &self.resource_types {
            if !types.contains(&entry.resource_type()) {
                return false;
            }
        }

        let id_match = match &self.resource_ids {
            ResourceIdFilter::Unfiltered => true,
            ResourceIdFilter::Applicable(requested) => requested
                .iter()
                .any(|id| entry.scope().applies_to(id.as_deref())),
            ResourceIdFilter::Exact(scope) => entry.scope() == scope,
        };
        if !id_match {
            return false;
        }

        let principal_match = match &self.principals {
            PrincipalFilter::Unfiltered => true,
            PrincipalFilter::Applicable { user_id, group_ids } => match entry.principal() {
                None => entry.kind() == AuthorizationKind::Global,
                Some(Principal::User(id)) => id == user_id,
                Some(Principal::Group(id)) => group_ids.contains(id),
            },
            PrincipalFilter::Members { user_ids, group_ids } => match entry.principal() {
                None => false,
                Some(Principal::User(id)) => user_ids.contains(id),
                Some(Principal::Group(id)) => group_ids.contains(id),
            },
        };
        if !principal_match {
            return false;
        }

        match self.permission_bits {
            Some(bits) => entry.bits() == ALL_BITS || entry.bits() & bits == bits,
            None => true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Mutations
// ═══════════════════════════════════════════════════════════════════════════════

/// A change to the entry table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryMutation {
    Create(AuthorizationEntry),
    UpdateBits { id: Uuid, bits: u32 },
    Delete(Uuid),
    /// Delete every entry scoped to this concrete resource instance,
    /// optionally only those bound to one principal. Wildcard entries are
    /// never touched.
    DeleteForResource {
        resource_type: ResourceType,
        resource_id: String,
        principal: Option<Principal>,
    },
}

impl EntryMutation {
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::UpdateBits { .. } => "update",
            Self::Delete(_) => "delete",
            Self::DeleteForResource { .. } => "delete_for_resource",
        }
    }

    /// Apply to an in-memory table. In strict mode an update or delete of a
    /// missing id fails; otherwise it is skipped.
    fn apply(
        &self,
        entries: &mut HashMap<Uuid, AuthorizationEntry>,
        strict: bool,
    ) -> Result<usize, StoreError> {
        match self {
            Self::Create(entry) => {
                if strict && entries.contains_key(&entry.id()) {
                    return Err(StoreError::Duplicate(entry.id()));
                }
                entries.insert(entry.id(), entry.clone());
                Ok(1)
            }
            Self::UpdateBits { id, bits } => match entries.get_mut(id) {
                Some(entry) => {
                    entry.set_bits(*bits);
                    Ok(1)
                }
                None if strict => Err(StoreError::NotFound(*id)),
                None => Ok(0),
            },
            Self::Delete(id) => match entries.remove(id) {
                Some(_) => Ok(1),
                None if strict => Err(StoreError::NotFound(*id)),
                None => Ok(0),
            },
            Self::DeleteForResource {
                resource_type,
                resource_id,
                principal,
            } => {
                let before = entries.len();
                entries.retain(|_, entry| {
                    let targeted = entry.resource_type() == *resource_type
                        && matches!(entry.scope(), ResourceScope::Instance(id) if id == resource_id)
                        && principal.as_ref().map_or(true, |p| entry.principal() == Some(p));
                    !targeted
                });
                Ok(before - entries.len())
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Persistence for authorization entries.
pub trait AuthorizationStore: Send + Sync + fmt::Debug {
    /// Every entry matching `filter`.
    fn find(&self, filter: &EntryFilter) -> Result<Vec<AuthorizationEntry>, StoreError>;

    /// Apply all mutations atomically, returning the number of rows touched.
    fn commit(&self, mutations: &[EntryMutation]) -> Result<usize, StoreError>;

    fn get(&self, id: Uuid) -> Result<Option<AuthorizationEntry>, StoreError> {
        Ok(self.find(&EntryFilter::new().ids(vec![id]))?.into_iter().next())
    }

    fn count(&self, filter: &EntryFilter) -> Result<usize, StoreError> {
        Ok(self.find(filter)?.len())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Transaction
// ═══════════════════════════════════════════════════════════════════════════════

/// Mutations staged alongside a business operation.
///
/// Nothing reaches the store until [`commit`](Self::commit). Dropping the
/// transaction, or calling [`rollback`](Self::rollback), discards the staged
/// mutations.
pub struct Transaction<'s> {
    store: &'s dyn AuthorizationStore,
    staged: Vec<EntryMutation>,
}

impl<'s> Transaction<'s> {
    pub fn new(store: &'s dyn AuthorizationStore) -> Self {
        Self {
            store,
            staged: Vec::new(),
        }
    }

    pub fn stage(&mut self, mutation: EntryMutation) {
        trace!(kind = mutation.kind_label(), "Staging authorization mutation");
        self.staged.push(mutation);
    }

    pub fn stage_all(&mut self, mutations: impl IntoIterator<Item = EntryMutation>) {
        for mutation in mutations {
            self.stage(mutation);
        }
    }

    pub fn staged(&self) -> &[EntryMutation] {
        &self.staged
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Entries matching `filter` as they will look after commit.
    pub fn find(&self, filter: &EntryFilter) -> Result<Vec<AuthorizationEntry>, StoreError> {
        let mut view: HashMap<Uuid, AuthorizationEntry> = self
            .store
            .find(filter)?
            .into_iter()
            .map(|e| (e.id(), e))
            .collect();
        for mutation in &self.staged {
            mutation.apply(&mut view, false)?;
        }
        let mut entries: Vec<AuthorizationEntry> =
            view.into_values().filter(|e| filter.matches(e)).collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    pub fn commit(mut self) -> Result<usize, StoreError> {
        let staged = std::mem::take(&mut self.staged);
        if staged.is_empty() {
            return Ok(0);
        }
        let touched = self.store.commit(&staged)?;
        debug!(mutations = staged.len(), rows = touched, "Committed authorization mutations");
        Ok(touched)
    }

    pub fn rollback(mut self) {
        let discarded = std::mem::take(&mut self.staged);
        debug!(mutations = discarded.len(), "Rolled back authorization mutations");
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            debug!(
                mutations = self.staged.len(),
                "Transaction dropped without commit; discarding staged mutations"
            );
        }
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("staged", &self.staged)
            .finish()
    }
}

fn sort_entries(entries: &mut [AuthorizationEntry]) {
    entries.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().cmp(&b.id()))
    });
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Reference store keeping entries in a lock-protected map.
#[derive(Debug, Default)]
pub struct InMemoryAuthorizationStore {
    entries: RwLock<HashMap<Uuid, AuthorizationEntry>>,
}

impl InMemoryAuthorizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl AuthorizationStore for InMemoryAuthorizationStore {
    fn find(&self, filter: &EntryFilter) -> Result<Vec<AuthorizationEntry>, StoreError> {
        let entries = self.entries.read();
        let mut found: Vec<AuthorizationEntry> = entries
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        sort_entries(&mut found);
        Ok(found)
    }

    fn commit(&self, mutations: &[EntryMutation]) -> Result<usize, StoreError> {
        let mut entries = self.entries.write();
        let mut working = entries.clone();
        let mut touched = 0;
        for mutation in mutations {
            touched += mutation.apply(&mut working, true)?;
        }
        *entries = working;
        Ok(touched)
    }

    fn get(&self, id: Uuid) -> Result<Option<AuthorizationEntry>, StoreError> {
        Ok(self.entries.read().get(&id).cloned())
    }
}
