//! Authorization core.
//!
//! Entries grant, revoke or globally allow permission bits on resources.
//! The [`PermissionEvaluator`] answers whether an identity satisfies a
//! [`CompositeRequirement`]; the [`AuthorizationService`] administers entries
//! and keeps them in step with resource lifecycle events.

pub mod disabled;
pub mod entry;
pub mod errors;
pub mod evaluator;
pub mod identity;
pub mod lifecycle;
pub mod operations;
pub mod permissions;
pub mod query;
pub mod requirement;
pub mod resources;
pub mod service;
pub mod store;

pub use disabled::{DisabledPermissions, TaskAssigneePermission};
pub use entry::{AuthorizationEntry, AuthorizationKind, Principal, ResourceScope};
pub use errors::{AuthzError, StoreError};
pub use evaluator::{satisfies, AuthorizationSnapshot, PermissionEvaluator};
pub use identity::{EnforcementGuard, IdentityContext};
pub use lifecycle::{
    grant_bits, withdraw_bits, AuthorizationLifecycleProvider, DefaultLifecycleProvider,
    ExtendedLifecycleProvider, IdentityLink, LifecycleExtension, LifecycleSettings, LinkType,
    PrincipalChange, ResourceCreated, ResourceRef,
};
pub use operations::{OperationRequirements, TaskRef};
pub use permissions::{
    HistoricProcessInstancePermissions, HistoricTaskPermissions, Permission, PermissionRegistry,
    Permissions, ProcessDefinitionPermissions, ProcessInstancePermissions, TaskPermissions,
    ALL_BITS, NONE_BITS,
};
pub use query::{filter_authorized, single_result, EntryQuery};
pub use requirement::{
    AuthorizationRequirement, CompositeRequirement, Decision, MissingAuthorization,
    RequirementBuilder,
};
pub use resources::{ResourceType, Resources, ANY};
pub use service::AuthorizationService;
pub use store::{
    AuthorizationStore, EntryFilter, EntryMutation, InMemoryAuthorizationStore, PrincipalFilter,
    ResourceIdFilter, Transaction,
};
