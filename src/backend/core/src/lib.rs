#![allow(clippy::result_large_err)]
//! # Flowguard Core
//!
//! Authorization and policy evaluation for process execution engines.
//!
//! ## Architecture
//!
//! - **Permissions**: bitmask permissions per resource type, resolved through a registry
//! - **Entries**: global, grant and revoke records scoped to one resource, all of them, or the type
//! - **Evaluator**: composite AND/OR requirements decided against one store snapshot
//! - **Lifecycle**: entries created, moved and deleted together with the resources they protect
//! - **Service**: administrative CRUD gated by the authorization resource itself
//! - **Engine**: fail-fast wiring of configuration, registry, store and lifecycle provider
//! - **Telemetry**: structured logging and decision metrics

pub mod authz;
pub mod config;
pub mod engine;
pub mod error;
pub mod telemetry;

pub use error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, FlowguardError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::authz::{
        AuthorizationEntry, AuthorizationKind, AuthorizationRequirement, AuthorizationService,
        AuthorizationStore, AuthzError, CompositeRequirement, Decision, EntryQuery, IdentityContext,
        InMemoryAuthorizationStore, MissingAuthorization, OperationRequirements, Permission,
        PermissionEvaluator, PermissionRegistry, Permissions, Principal, RequirementBuilder,
        ResourceRef, ResourceScope, ResourceType, Resources, TaskRef, Transaction,
    };
    pub use crate::config::EngineConfig;
    pub use crate::engine::{AuthorizationEngine, EngineBuilder};
    pub use crate::error::{ErrorCode, ErrorContext, FlowguardError, Result};
}
