//! Queries over entries, and authorized filtering of result lists.
//!
//! [`EntryQuery`] is the administrative query over stored entries.
//! [`filter_authorized`] narrows a list of business rows to those the
//! identity may see. It decides every row with the point-check evaluator
//! against one shared snapshot, so list results can never disagree with
//! the point check.

use uuid::Uuid;

use super::entry::{AuthorizationEntry, AuthorizationKind, ResourceScope};
use super::errors::AuthzError;
use super::evaluator::PermissionEvaluator;
use super::identity::IdentityContext;
use super::permissions::Permission;
use super::requirement::CompositeRequirement;
use super::resources::ResourceType;
use super::store::{AuthorizationStore, EntryFilter};

// ═══════════════════════════════════════════════════════════════════════════════
// Entry Query
// ═══════════════════════════════════════════════════════════════════════════════

/// Administrative query over authorization entries.
///
/// `user_id_in` and `group_id_in` combine with OR; every other criterion is
/// AND-ed on top.
#[derive(Debug, Clone, Default)]
pub struct EntryQuery {
    id: Option<Uuid>,
    kind: Option<AuthorizationKind>,
    user_ids: Vec<String>,
    group_ids: Vec<String>,
    resource_type: Option<ResourceType>,
    resource_id: Option<ResourceScope>,
    permission: Option<Permission>,
}

impl EntryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn kind(mut self, kind: AuthorizationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn user_id_in<I, S>(mut self, user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_ids.extend(user_ids.into_iter().map(Into::into));
        self
    }

    pub fn group_id_in<I, S>(mut self, group_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_ids.extend(group_ids.into_iter().map(Into::into));
        self
    }

    pub fn resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    /// Match entries stored with exactly this id; `*` matches wildcard entries.
    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(ResourceScope::instance(resource_id));
        self
    }

    pub fn has_permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn to_filter(&self) -> EntryFilter {
        let mut filter = EntryFilter::new();
        if let Some(id) = self.id {
            filter = filter.ids(vec![id]);
        }
        if let Some(kind) = self.kind {
            filter = filter.kind(kind);
        }
        if !self.user_ids.is_empty() || !self.group_ids.is_empty() {
            filter = filter.members(self.user_ids.clone(), self.group_ids.clone());
        }
        if let Some(resource_type) = self.resource_type {
            filter = filter.resource_type(resource_type);
        }
        if let Some(scope) = &self.resource_id {
            filter = filter.scope(scope.clone());
        }
        if let Some(permission) = self.permission {
            filter = filter.has_bits(permission.bits());
        }
        filter
    }

    pub fn list(&self, store: &dyn AuthorizationStore) -> Result<Vec<AuthorizationEntry>, AuthzError> {
        Ok(store.find(&self.to_filter())?)
    }

    pub fn count(&self, store: &dyn AuthorizationStore) -> Result<usize, AuthzError> {
        Ok(store.count(&self.to_filter())?)
    }

    pub fn single_result(
        &self,
        store: &dyn AuthorizationStore,
    ) -> Result<Option<AuthorizationEntry>, AuthzError> {
        single_result(self.list(store)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authorized Filtering
// ═══════════════════════════════════════════════════════════════════════════════

/// Keep the rows of `items` the identity is authorized for.
///
/// `requirement` maps a row to what reading it takes. All rows are decided
/// against a single snapshot.
pub fn filter_authorized<T, F>(
    evaluator: &PermissionEvaluator,
    ctx: &IdentityContext,
    items: Vec<T>,
    requirement: F,
) -> Result<Vec<T>, AuthzError>
where
    F: Fn(&T) -> CompositeRequirement,
{
    let requirements: Vec<CompositeRequirement> = items.iter().map(&requirement).collect();
    let decisions = evaluator.decide_all(ctx, &requirements)?;
    Ok(items
        .into_iter()
        .zip(decisions)
        .filter_map(|(item, decision)| decision.is_granted().then_some(item))
        .collect())
}

/// At most one row, or [`AuthzError::NotUnique`].
///
/// Asking for a single result when several rows qualify is a caller error,
/// not an authorization failure.
pub fn single_result<T>(mut rows: Vec<T>) -> Result<Option<T>, AuthzError> {
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.pop()),
        count => Err(AuthzError::NotUnique { count }),
    }
}
