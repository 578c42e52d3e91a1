//! Administrative entry management and lifecycle application.
//!
//! Creating, updating, deleting and querying entries through this service
//! requires `ALL` on the authorization resource. [`bootstrap`] and
//! [`bootstrap_administrator`] skip the check so the first administrator can
//! be set up on an empty store.
//!
//! Lifecycle hooks never commit by themselves: they stage mutations in the
//! caller's [`Transaction`], which commits or rolls back together with the
//! business change.
//!
//! [`bootstrap`]: AuthorizationService::bootstrap
//! [`bootstrap_administrator`]: AuthorizationService::bootstrap_administrator

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::entry::{AuthorizationEntry, AuthorizationKind, Principal, ResourceScope};
use super::errors::AuthzError;
use super::evaluator::PermissionEvaluator;
use super::identity::IdentityContext;
use super::lifecycle::{
    AuthorizationLifecycleProvider, IdentityLink, PrincipalChange, ResourceCreated, ResourceRef,
};
use super::operations::OperationRequirements;
use super::permissions::{Permissions, PermissionRegistry, ALL_BITS};
use super::query::EntryQuery;
use super::resources::{ResourceType, Resources};
use super::store::{AuthorizationStore, EntryFilter, EntryMutation, Transaction};
use crate::telemetry::metrics::LifecycleMetrics;

/// Entry administration and lifecycle bookkeeping over one store.
#[derive(Debug, Clone)]
pub struct AuthorizationService {
    registry: Arc<PermissionRegistry>,
    evaluator: PermissionEvaluator,
    store: Arc<dyn AuthorizationStore>,
    lifecycle: Arc<dyn AuthorizationLifecycleProvider>,
    operations: OperationRequirements,
}

impl AuthorizationService {
    pub fn new(
        registry: Arc<PermissionRegistry>,
        evaluator: PermissionEvaluator,
        store: Arc<dyn AuthorizationStore>,
        lifecycle: Arc<dyn AuthorizationLifecycleProvider>,
        operations: OperationRequirements,
    ) -> Self {
        Self {
            registry,
            evaluator,
            store,
            lifecycle,
            operations,
        }
    }

    pub fn lifecycle(&self) -> &dyn AuthorizationLifecycleProvider {
        self.lifecycle.as_ref()
    }

    fn ensure_admin(&self, ctx: &IdentityContext) -> Result<(), AuthzError> {
        self.evaluator.check(ctx, &self.operations.manage_authorizations())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Administrative CRUD
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_entry(
        &self,
        ctx: &IdentityContext,
        entry: AuthorizationEntry,
    ) -> Result<AuthorizationEntry, AuthzError> {
        self.ensure_admin(ctx)?;
        entry.validate(&self.registry)?;
        self.store.commit(&[EntryMutation::Create(entry.clone())])?;
        info!(
            entry_id = %entry.id(),
            kind = %entry.kind(),
            resource_type = %entry.resource_type(),
            resource_id = ?entry.resource_id(),
            "Authorization entry created"
        );
        Ok(entry)
    }

    /// Replace the permission bits of an existing entry.
    pub fn update_entry(
        &self,
        ctx: &IdentityContext,
        id: Uuid,
        bits: u32,
    ) -> Result<AuthorizationEntry, AuthzError> {
        self.ensure_admin(ctx)?;
        let mut entry = self.store.get(id)?.ok_or(AuthzError::EntryNotFound(id))?;
        entry.set_bits(bits);
        entry.validate(&self.registry)?;
        self.store.commit(&[EntryMutation::UpdateBits { id, bits }])?;
        info!(entry_id = %id, bits = bits, "Authorization entry updated");
        Ok(entry)
    }

    /// Delete an entry together with the entries protecting it.
    pub fn delete_entry(&self, ctx: &IdentityContext, id: Uuid) -> Result<(), AuthzError> {
        self.ensure_admin(ctx)?;
        if self.store.get(id)?.is_none() {
            return Err(AuthzError::EntryNotFound(id));
        }
        self.store.commit(&[
            EntryMutation::Delete(id),
            EntryMutation::DeleteForResource {
                resource_type: Resources::AUTHORIZATION,
                resource_id: id.to_string(),
                principal: None,
            },
        ])?;
        info!(entry_id = %id, "Authorization entry deleted");
        Ok(())
    }

    pub fn query(
        &self,
        ctx: &IdentityContext,
        query: &EntryQuery,
    ) -> Result<Vec<AuthorizationEntry>, AuthzError> {
        self.ensure_admin(ctx)?;
        query.list(self.store.as_ref())
    }

    pub fn query_single(
        &self,
        ctx: &IdentityContext,
        query: &EntryQuery,
    ) -> Result<Option<AuthorizationEntry>, AuthzError> {
        self.ensure_admin(ctx)?;
        query.single_result(self.store.as_ref())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bootstrap
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist entries without an authorization check.
    pub fn bootstrap(&self, entries: Vec<AuthorizationEntry>) -> Result<usize, AuthzError> {
        for entry in &entries {
            entry.validate(&self.registry)?;
        }
        let mutations: Vec<EntryMutation> = entries.into_iter().map(EntryMutation::Create).collect();
        let created = self.store.commit(&mutations)?;
        info!(entries = created, "Bootstrapped authorization entries");
        Ok(created)
    }

    /// Grant `principal` `ALL` on every instance of every registered resource
    /// type. Types the principal already holds such a grant for are skipped.
    pub fn bootstrap_administrator(&self, principal: Principal) -> Result<usize, AuthzError> {
        let held = self.store.find(
            &EntryFilter::new()
                .principal(&principal)
                .kind(AuthorizationKind::Grant)
                .scope(ResourceScope::Any)
                .has_bits(ALL_BITS),
        )?;

        let entries: Vec<AuthorizationEntry> = self
            .registry
            .resource_types()
            .into_iter()
            .filter(|t| !held.iter().any(|e| e.resource_type() == *t))
            .map(|t| {
                AuthorizationEntry::grant(principal.clone(), t, ResourceScope::Any)
                    .with_permission(Permissions::ALL)
            })
            .collect();

        info!(principal = %principal, resource_types = entries.len(), "Bootstrapping administrator");
        self.bootstrap(entries)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self.store.as_ref())
    }

    pub fn resource_created(
        &self,
        tx: &mut Transaction<'_>,
        event: &ResourceCreated,
    ) -> Result<usize, AuthzError> {
        let mutations = self.lifecycle.resource_created(event);
        Ok(stage(tx, mutations, "resource_created", &event.resource))
    }

    pub fn principal_changed(
        &self,
        tx: &mut Transaction<'_>,
        event: &PrincipalChange,
    ) -> Result<usize, AuthzError> {
        let existing = existing_for(tx, &event.resource)?;
        let mutations = self.lifecycle.principal_changed(event, &existing);
        Ok(stage(tx, mutations, "principal_changed", &event.resource))
    }

    pub fn identity_link_added(
        &self,
        tx: &mut Transaction<'_>,
        link: &IdentityLink,
    ) -> Result<usize, AuthzError> {
        let existing = existing_for(tx, &link.resource)?;
        let mutations = self.lifecycle.identity_link_added(link, &existing);
        Ok(stage(tx, mutations, "identity_link_added", &link.resource))
    }

    pub fn identity_link_removed(
        &self,
        tx: &mut Transaction<'_>,
        link: &IdentityLink,
    ) -> Result<usize, AuthzError> {
        let existing = existing_for(tx, &link.resource)?;
        let mutations = self.lifecycle.identity_link_removed(link, &existing);
        Ok(stage(tx, mutations, "identity_link_removed", &link.resource))
    }

    pub fn resource_deleted(
        &self,
        tx: &mut Transaction<'_>,
        resource: &ResourceRef,
    ) -> Result<usize, AuthzError> {
        let mutations = self.lifecycle.resource_deleted(resource);
        Ok(stage(tx, mutations, "resource_deleted", resource))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delete by resource
    // ─────────────────────────────────────────────────────────────────────────

    pub fn delete_for_resource(
        &self,
        tx: &mut Transaction<'_>,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Result<(), AuthzError> {
        stage_resource_delete(tx, resource_type, resource_id, None)
    }

    pub fn delete_for_resource_and_user(
        &self,
        tx: &mut Transaction<'_>,
        resource_type: ResourceType,
        resource_id: &str,
        user_id: &str,
    ) -> Result<(), AuthzError> {
        require_id(user_id, "User id")?;
        stage_resource_delete(tx, resource_type, resource_id, Some(Principal::user(user_id)))
    }

    pub fn delete_for_resource_and_group(
        &self,
        tx: &mut Transaction<'_>,
        resource_type: ResourceType,
        resource_id: &str,
        group_id: &str,
    ) -> Result<(), AuthzError> {
        require_id(group_id, "Group id")?;
        stage_resource_delete(tx, resource_type, resource_id, Some(Principal::group(group_id)))
    }

    pub fn delete_for_resources(
        &self,
        tx: &mut Transaction<'_>,
        resource_type: ResourceType,
        resource_ids: &[&str],
    ) -> Result<(), AuthzError> {
        for id in resource_ids {
            require_id(id, "Resource id")?;
        }
        for id in resource_ids {
            stage_resource_delete(tx, resource_type, id, None)?;
        }
        Ok(())
    }
}

fn require_id(id: &str, what: &str) -> Result<(), AuthzError> {
    if id.is_empty() {
        Err(AuthzError::InvalidArgument(format!("{} cannot be null or empty", what)))
    } else {
        Ok(())
    }
}

fn stage_resource_delete(
    tx: &mut Transaction<'_>,
    resource_type: ResourceType,
    resource_id: &str,
    principal: Option<Principal>,
) -> Result<(), AuthzError> {
    require_id(resource_id, "Resource id")?;
    tx.stage(EntryMutation::DeleteForResource {
        resource_type,
        resource_id: resource_id.to_string(),
        principal,
    });
    Ok(())
}

fn existing_for(
    tx: &Transaction<'_>,
    resource: &ResourceRef,
) -> Result<Vec<AuthorizationEntry>, AuthzError> {
    let filter = EntryFilter::new().scope(ResourceScope::Instance(resource.resource_id.clone()));
    Ok(tx.find(&filter)?)
}

fn stage(
    tx: &mut Transaction<'_>,
    mutations: Vec<EntryMutation>,
    event: &'static str,
    resource: &ResourceRef,
) -> usize {
    let count = mutations.len();
    for mutation in &mutations {
        LifecycleMetrics::record(mutation.kind_label(), 1);
    }
    tx.stage_all(mutations);
    debug!(
        event = event,
        resource_type = %resource.resource_type,
        resource_id = %resource.resource_id,
        mutations = count,
        "Staged lifecycle mutations"
    );
    count
}
