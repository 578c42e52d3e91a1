//! Grant-minus-revoke permission evaluation.
//!
//! The evaluator answers "can this identity do this?" for leaf and composite
//! requirements:
//!
//! 1. enforcement switched off on the context: granted;
//! 2. permission disabled engine-wide: that leaf is granted;
//! 3. no user id (system context): granted;
//! 4. otherwise one snapshot of applicable entries is fetched and every leaf
//!    is decided against it.
//!
//! For a leaf on `(type, id)`, every applicable grant and global entry is
//! OR-ed together, then every applicable revoke entry is subtracted. Instance,
//! wildcard and unscoped entries all take part equally; the most specific
//! entry does not win. Group entries count exactly like the user's own.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::disabled::DisabledPermissions;
use super::entry::AuthorizationEntry;
use super::errors::AuthzError;
use super::identity::IdentityContext;
use super::permissions::{Permission, PermissionRegistry, ALL_BITS, NONE_BITS};
use super::requirement::{AuthorizationRequirement, CompositeRequirement, Decision};
use super::resources::ResourceType;
use super::store::{AuthorizationStore, EntryFilter, StoreError};
use crate::telemetry::metrics::{DecisionMetrics, EvaluationTimer};

// ═══════════════════════════════════════════════════════════════════════════════
// Snapshot
// ═══════════════════════════════════════════════════════════════════════════════

/// Entries applicable to one identity and a set of requested resources,
/// fetched in a single store round trip.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationSnapshot {
    entries: Vec<AuthorizationEntry>,
}

impl AuthorizationSnapshot {
    pub fn from_entries(entries: Vec<AuthorizationEntry>) -> Self {
        Self { entries }
    }

    /// Fetch the entries that can affect any of `leaves` for this user.
    pub fn fetch<'a>(
        store: &dyn AuthorizationStore,
        user_id: &str,
        group_ids: Vec<String>,
        leaves: impl IntoIterator<Item = &'a AuthorizationRequirement>,
    ) -> Result<Self, StoreError> {
        let mut types = Vec::new();
        let mut ids: Vec<Option<String>> = Vec::new();
        for leaf in leaves {
            types.push(leaf.resource_type);
            if !ids.contains(&leaf.resource_id) {
                ids.push(leaf.resource_id.clone());
            }
        }
        if types.is_empty() {
            return Ok(Self::default());
        }

        let filter = EntryFilter::new()
            .resource_types(types)
            .applicable_to(ids)
            .applicable_principals(user_id, group_ids);
        Ok(Self::from_entries(store.find(&filter)?))
    }

    pub fn entries(&self) -> &[AuthorizationEntry] {
        &self.entries
    }

    /// Granted bits minus revoked bits for one resource.
    pub fn effective_bits(&self, resource_type: ResourceType, resource_id: Option<&str>) -> u32 {
        let (granted, revoked) = self
            .entries
            .iter()
            .filter(|e| e.resource_type() == resource_type && e.scope().applies_to(resource_id))
            .fold((NONE_BITS, NONE_BITS), |(granted, revoked), e| {
                if e.is_additive() {
                    (granted | e.bits(), revoked)
                } else {
                    (granted, revoked | e.bits())
                }
            });
        granted & !revoked
    }
}

/// Whether an effective mask satisfies `permission` on `resource_type`.
///
/// `NONE` asks for no bits, so every mask satisfies it, including an empty
/// one. A literal `effective & 0 != 0` test would make `NONE` unsatisfiable
/// for everyone but holders of the `ALL` sentinel. `ALL` needs every bit
/// registered for the type. Anything else needs all of its bits.
pub fn satisfies(
    registry: &PermissionRegistry,
    effective: u32,
    resource_type: ResourceType,
    permission: Permission,
) -> bool {
    if permission.is_none() {
        return true;
    }
    if permission.is_all() {
        let all = registry.all_mask(resource_type);
        return effective == ALL_BITS || (all != NONE_BITS && effective & all == all);
    }
    effective & permission.bits() == permission.bits()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Evaluator
// ═══════════════════════════════════════════════════════════════════════════════

/// Stateless evaluator over an entry store. Safe to share across threads.
#[derive(Debug, Clone)]
pub struct PermissionEvaluator {
    registry: Arc<PermissionRegistry>,
    disabled: Arc<DisabledPermissions>,
    store: Arc<dyn AuthorizationStore>,
}

impl PermissionEvaluator {
    pub fn new(
        registry: Arc<PermissionRegistry>,
        disabled: Arc<DisabledPermissions>,
        store: Arc<dyn AuthorizationStore>,
    ) -> Self {
        Self {
            registry,
            disabled,
            store,
        }
    }

    pub fn registry(&self) -> &PermissionRegistry {
        &self.registry
    }

    pub fn disabled(&self) -> &DisabledPermissions {
        &self.disabled
    }

    pub fn store(&self) -> &dyn AuthorizationStore {
        self.store.as_ref()
    }

    /// Decide a composite requirement.
    pub fn decide(
        &self,
        ctx: &IdentityContext,
        requirement: &CompositeRequirement,
    ) -> Result<Decision, AuthzError> {
        let mut decisions = self.decide_all(ctx, std::slice::from_ref(requirement))?;
        Ok(decisions.pop().unwrap_or(Decision::Granted))
    }

    /// Decide several requirements against one shared snapshot.
    ///
    /// Used by list filtering so that a page of results costs one store
    /// round trip.
    pub fn decide_all(
        &self,
        ctx: &IdentityContext,
        requirements: &[CompositeRequirement],
    ) -> Result<Vec<Decision>, AuthzError> {
        if !ctx.is_enforced() {
            debug!(user_id = ?ctx.user_id(), "Authorization enforcement disabled; granting");
            return Ok(vec![Decision::Granted; requirements.len()]);
        }

        let user_id = match ctx.user_id() {
            Some(user_id) => user_id,
            None => {
                debug!("System context; granting");
                return Ok(vec![Decision::Granted; requirements.len()]);
            }
        };

        let _timer = EvaluationTimer::start();

        let mut pending: Vec<&AuthorizationRequirement> = Vec::new();
        for requirement in requirements {
            for leaf in requirement.leaves() {
                if self.disabled.is_disabled(leaf.permission) {
                    continue;
                }
                self.validate_resource(leaf)?;
                pending.push(leaf);
            }
        }

        let snapshot = if pending.is_empty() {
            AuthorizationSnapshot::default()
        } else {
            AuthorizationSnapshot::fetch(
                self.store.as_ref(),
                user_id,
                ctx.effective_groups(),
                pending.iter().copied(),
            )?
        };

        let mut cache: HashMap<(ResourceType, Option<String>), u32> = HashMap::new();
        let mut decisions = Vec::with_capacity(requirements.len());
        for requirement in requirements {
            let decision = requirement.evaluate(&mut |leaf: &AuthorizationRequirement| {
                Ok::<bool, AuthzError>(self.leaf_granted(&snapshot, &mut cache, leaf))
            })?;
            self.record(user_id, requirement, &decision);
            decisions.push(decision);
        }
        Ok(decisions)
    }

    /// Whether a composite requirement is met.
    pub fn is_authorized(
        &self,
        ctx: &IdentityContext,
        requirement: &CompositeRequirement,
    ) -> Result<bool, AuthzError> {
        Ok(self.decide(ctx, requirement)?.is_granted())
    }

    /// Whether a single leaf requirement is met.
    pub fn is_authorized_leaf(
        &self,
        ctx: &IdentityContext,
        requirement: &AuthorizationRequirement,
    ) -> Result<bool, AuthzError> {
        self.is_authorized(ctx, &CompositeRequirement::Leaf(requirement.clone()))
    }

    /// Fail with [`AuthzError::Denied`] unless the requirement is met.
    pub fn check(
        &self,
        ctx: &IdentityContext,
        requirement: &CompositeRequirement,
    ) -> Result<(), AuthzError> {
        let decision = self.decide(ctx, requirement)?;
        if let Decision::Denied(missing) = &decision {
            let user_id = ctx.user_id().unwrap_or_default();
            warn!(
                user_id = %user_id,
                missing = missing.len(),
                "Authorization denied"
            );
            DecisionMetrics::record_denial();
        }
        decision.into_result(ctx.user_id().unwrap_or_default())
    }

    fn leaf_granted(
        &self,
        snapshot: &AuthorizationSnapshot,
        cache: &mut HashMap<(ResourceType, Option<String>), u32>,
        leaf: &AuthorizationRequirement,
    ) -> bool {
        if self.disabled.is_disabled(leaf.permission) {
            return true;
        }
        let effective = *cache
            .entry((leaf.resource_type, leaf.resource_id.clone()))
            .or_insert_with(|| {
                snapshot.effective_bits(leaf.resource_type, leaf.resource_id.as_deref())
            });
        satisfies(&self.registry, effective, leaf.resource_type, leaf.permission)
    }

    fn validate_resource(&self, leaf: &AuthorizationRequirement) -> Result<(), AuthzError> {
        if self.registry.is_valid_for(leaf.resource_type, leaf.permission) {
            Ok(())
        } else {
            Err(AuthzError::InvalidResourceForPermission {
                resource_type: leaf.resource_type.name().to_string(),
                permission: leaf.permission.name().to_string(),
            })
        }
    }

    fn record(&self, user_id: &str, requirement: &CompositeRequirement, decision: &Decision) {
        let (resource_type, permission) = match requirement {
            CompositeRequirement::Leaf(leaf) => (leaf.resource_type.name(), leaf.permission.name()),
            _ => ("composite", "composite"),
        };
        debug!(
            user_id = %user_id,
            resource_type = resource_type,
            permission = permission,
            decision = if decision.is_granted() { "granted" } else { "denied" },
            "Authorization decided"
        );
        DecisionMetrics::record(resource_type, permission, decision.is_granted());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::entry::{Principal, ResourceScope};
    use crate::authz::permissions::Permissions;
    use crate::authz::resources::Resources;
    use crate::authz::store::{EntryMutation, InMemoryAuthorizationStore};

    fn setup(entries: Vec<AuthorizationEntry>) -> PermissionEvaluator {
        let store = InMemoryAuthorizationStore::new();
        let mutations: Vec<EntryMutation> = entries.into_iter().map(EntryMutation::Create).collect();
        store.commit(&mutations).unwrap();
        PermissionEvaluator::new(
            Arc::new(PermissionRegistry::with_defaults()),
            Arc::new(DisabledPermissions::none()),
            Arc::new(store),
        )
    }

    fn read_task(id: &str) -> CompositeRequirement {
        CompositeRequirement::leaf(Permissions::READ, Resources::TASK, id)
    }

    #[test]
    fn test_no_entries_denies() {
        let evaluator = setup(vec![]);
        let ctx = IdentityContext::user("demo");
        assert!(!evaluator.is_authorized(&ctx, &read_task("t1")).unwrap());
    }

    #[test]
    fn test_grant_on_instance() {
        let evaluator = setup(vec![AuthorizationEntry::grant(
            Principal::user("demo"),
            Resources::TASK,
            ResourceScope::instance("t1"),
        )
        .with_permission(Permissions::READ)]);
        let ctx = IdentityContext::user("demo");
        assert!(evaluator.is_authorized(&ctx, &read_task("t1")).unwrap());
        assert!(!evaluator.is_authorized(&ctx, &read_task("t2")).unwrap());
    }

    #[test]
    fn test_revoke_on_instance_beats_wildcard_grant() {
        let evaluator = setup(vec![
            AuthorizationEntry::grant(Principal::user("demo"), Resources::TASK, ResourceScope::Any)
                .with_permission(Permissions::ALL),
            AuthorizationEntry::revoke(
                Principal::user("demo"),
                Resources::TASK,
                ResourceScope::instance("t1"),
            )
            .with_permission(Permissions::READ),
        ]);
        let ctx = IdentityContext::user("demo");
        assert!(!evaluator.is_authorized(&ctx, &read_task("t1")).unwrap());
        assert!(evaluator.is_authorized(&ctx, &read_task("t2")).unwrap());
        let update = CompositeRequirement::leaf(Permissions::UPDATE, Resources::TASK, "t1");
        assert!(evaluator.is_authorized(&ctx, &update).unwrap());
    }

    #[test]
    fn test_global_entry_applies_to_everyone() {
        let evaluator = setup(vec![AuthorizationEntry::global(Resources::TASK, ResourceScope::Any)
            .with_permission(Permissions::READ)]);
        let ctx = IdentityContext::user("anyone");
        assert!(evaluator.is_authorized(&ctx, &read_task("t9")).unwrap());
    }

    #[test]
    fn test_group_revoke_subtracts_user_grant() {
        let evaluator = setup(vec![
            AuthorizationEntry::grant(Principal::user("demo"), Resources::TASK, ResourceScope::Any)
                .with_permission(Permissions::READ),
            AuthorizationEntry::revoke(Principal::group("interns"), Resources::TASK, ResourceScope::Any)
                .with_permission(Permissions::READ),
        ]);
        let in_group = IdentityContext::user("demo").with_groups(vec!["interns".into()]);
        let no_groups = IdentityContext::user("demo");
        assert!(!evaluator.is_authorized(&in_group, &read_task("t1")).unwrap());
        assert!(evaluator.is_authorized(&no_groups, &read_task("t1")).unwrap());
    }

    #[test]
    fn test_all_requirement_needs_every_registered_bit() {
        let registry = PermissionRegistry::with_defaults();
        let all = registry.all_mask(Resources::APPLICATION);
        assert!(satisfies(&registry, all, Resources::APPLICATION, Permissions::ALL));
        assert!(satisfies(&registry, ALL_BITS, Resources::TASK, Permissions::ALL));
        assert!(!satisfies(&registry, 2, Resources::TASK, Permissions::ALL));
        assert!(satisfies(&registry, 0, Resources::TASK, Permissions::NONE));
    }

    #[test]
    fn test_invalid_resource_for_permission() {
        let evaluator = setup(vec![]);
        let ctx = IdentityContext::user("demo");
        let req = CompositeRequirement::leaf(Permissions::ACCESS, Resources::TASK, "t1");
        let err = evaluator.is_authorized(&ctx, &req).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidResourceForPermission { .. }));
    }

    #[test]
    fn test_check_reports_user_and_missing() {
        let evaluator = setup(vec![]);
        let ctx = IdentityContext::user("demo");
        let err = evaluator.check(&ctx, &read_task("t1")).unwrap_err();
        assert!(err.is_denied());
        assert!(err.to_string().contains("'demo'"));
        assert!(err.to_string().contains("'READ' permission on resource 't1' of type 'Task'"));
    }

    #[test]
    fn test_disabled_enforcement_and_system_context() {
        let evaluator = setup(vec![]);
        let ctx = IdentityContext::user("demo").with_enforcement(false);
        assert!(evaluator.is_authorized(&ctx, &read_task("t1")).unwrap());
        assert!(evaluator
            .is_authorized(&IdentityContext::system(), &read_task("t1"))
            .unwrap());
    }

    #[test]
    fn test_decide_all_shares_snapshot() {
        let evaluator = setup(vec![AuthorizationEntry::grant(
            Principal::user("demo"),
            Resources::TASK,
            ResourceScope::instance("t2"),
        )
        .with_permission(Permissions::READ)]);
        let ctx = IdentityContext::user("demo");
        let decisions = evaluator
            .decide_all(&ctx, &[read_task("t1"), read_task("t2")])
            .unwrap();
        assert!(decisions[0].is_denied());
        assert!(decisions[1].is_granted());
    }
}
