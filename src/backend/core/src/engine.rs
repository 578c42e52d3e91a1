//! Engine wiring.
//!
//! [`EngineBuilder`] turns an [`EngineConfig`] into an [`AuthorizationEngine`].
//! Construction resolves the disabled permission names and the default task
//! assignee permission up front and fails on the first invalid one, so no
//! check ever runs against a half-valid configuration. Everything resolved at
//! build time is immutable afterwards.
//!
//! # Example
//!
//! ```rust,no_run
//! use flowguard_core::prelude::*;
//!
//! let engine = EngineBuilder::new(EngineConfig::default()).build()?;
//! let ctx = engine.identity("demo", Some(vec!["sales".to_string()]));
//! engine.check(&ctx, &engine.operations().read_process_definition("invoice"))?;
//! # Ok::<(), flowguard_core::FlowguardError>(())
//! ```

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::authz::{
    AuthorizationLifecycleProvider, AuthorizationService, AuthorizationStore, CompositeRequirement,
    DefaultLifecycleProvider, DisabledPermissions, ExtendedLifecycleProvider, IdentityContext,
    InMemoryAuthorizationStore, LifecycleExtension, LifecycleSettings, OperationRequirements,
    PermissionEvaluator, PermissionRegistry, TaskAssigneePermission,
};
use crate::config::EngineConfig;
use crate::error::Result;

type ProviderFactory = Box<dyn FnOnce(LifecycleSettings) -> Arc<dyn AuthorizationLifecycleProvider>>;

enum LifecycleSource {
    Default,
    Custom(Arc<dyn AuthorizationLifecycleProvider>),
    Extended(ProviderFactory),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Builds an [`AuthorizationEngine`].
///
/// Defaults: the built-in permission registry, an in-memory entry store and
/// the default lifecycle provider.
pub struct EngineBuilder {
    config: EngineConfig,
    registry: Option<PermissionRegistry>,
    store: Option<Arc<dyn AuthorizationStore>>,
    lifecycle: LifecycleSource,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: None,
            store: None,
            lifecycle: LifecycleSource::Default,
        }
    }

    /// Use a registry with custom resource types or permissions.
    pub fn registry(mut self, registry: PermissionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn store(mut self, store: Arc<dyn AuthorizationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the default lifecycle provider entirely.
    pub fn lifecycle(mut self, provider: Arc<dyn AuthorizationLifecycleProvider>) -> Self {
        self.lifecycle = LifecycleSource::Custom(provider);
        self
    }

    /// Keep the default lifecycle provider and layer `extension` on top of it.
    pub fn lifecycle_extension<E>(mut self, extension: E) -> Self
    where
        E: LifecycleExtension + 'static,
    {
        let factory = move |settings| -> Arc<dyn AuthorizationLifecycleProvider> {
            Arc::new(ExtendedLifecycleProvider::new(
                DefaultLifecycleProvider::new(settings),
                extension,
            ))
        };
        self.lifecycle = LifecycleSource::Extended(Box::new(factory));
        self
    }

    pub fn build(self) -> Result<AuthorizationEngine> {
        let config = self.config;
        let registry = Arc::new(self.registry.unwrap_or_else(PermissionRegistry::with_defaults));

        let disabled = Arc::new(DisabledPermissions::from_names(
            config.disabled_permissions.as_slice(),
            &registry,
        )?);
        let task_assignee_permission =
            TaskAssigneePermission::from_config(config.default_task_assignee_permission.as_deref())?;

        let settings = LifecycleSettings {
            task_assignee_permission,
            enforce_specific_variable_permission: config.enforce_specific_variable_permission,
            enable_historic_instance_permissions: config.enable_historic_instance_permissions,
        };
        let lifecycle: Arc<dyn AuthorizationLifecycleProvider> = match self.lifecycle {
            LifecycleSource::Default => Arc::new(DefaultLifecycleProvider::new(settings)),
            LifecycleSource::Custom(provider) => provider,
            LifecycleSource::Extended(factory) => factory(settings),
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryAuthorizationStore::new()));
        let operations = OperationRequirements::new(
            config.enforce_specific_variable_permission,
            config.enable_historic_instance_permissions,
        );
        let evaluator = PermissionEvaluator::new(registry.clone(), disabled.clone(), store.clone());
        let service = AuthorizationService::new(
            registry.clone(),
            evaluator.clone(),
            store,
            lifecycle,
            operations,
        );

        info!(
            authorization_enabled = config.authorization_enabled,
            disabled_permissions = ?disabled.names(),
            task_assignee_permission = %task_assignee_permission,
            specific_variable_permissions = config.enforce_specific_variable_permission,
            historic_instance_permissions = config.enable_historic_instance_permissions,
            resource_types = registry.resource_types().len(),
            "Authorization engine built"
        );

        Ok(AuthorizationEngine {
            config,
            registry,
            evaluator,
            service,
            operations,
            task_assignee_permission,
        })
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = match &self.lifecycle {
            LifecycleSource::Default => "default",
            LifecycleSource::Custom(_) => "custom",
            LifecycleSource::Extended(_) => "extended",
        };
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("custom_registry", &self.registry.is_some())
            .field("store", &self.store)
            .field("lifecycle", &lifecycle)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════════════════════════

/// The assembled authorization core.
#[derive(Debug, Clone)]
pub struct AuthorizationEngine {
    config: EngineConfig,
    registry: Arc<PermissionRegistry>,
    evaluator: PermissionEvaluator,
    service: AuthorizationService,
    operations: OperationRequirements,
    task_assignee_permission: TaskAssigneePermission,
}

impl AuthorizationEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Identity context for a request, with enforcement set from the
    /// configuration.
    pub fn identity(&self, user_id: impl Into<String>, group_ids: Option<Vec<String>>) -> IdentityContext {
        IdentityContext::new(user_id, group_ids).with_enforcement(self.config.authorization_enabled)
    }

    /// Whether the context's user is a configured administrator.
    pub fn is_admin(&self, ctx: &IdentityContext) -> bool {
        let Some(user_id) = ctx.user_id() else {
            return false;
        };
        if self.config.admin_users.iter().any(|u| u == user_id) {
            return true;
        }
        ctx.group_ids()
            .unwrap_or_default()
            .iter()
            .any(|g| self.config.admin_groups.contains(g))
    }

    pub fn is_authorized(&self, ctx: &IdentityContext, requirement: &CompositeRequirement) -> Result<bool> {
        Ok(self.evaluator.is_authorized(ctx, requirement)?)
    }

    /// Fail with an access-denied error unless the requirement is met.
    pub fn check(&self, ctx: &IdentityContext, requirement: &CompositeRequirement) -> Result<()> {
        Ok(self.evaluator.check(ctx, requirement)?)
    }

    /// Like [`check`](Self::check), but administrators always pass.
    pub fn check_admin_or(&self, ctx: &IdentityContext, requirement: &CompositeRequirement) -> Result<()> {
        if ctx.is_enforced() && self.is_admin(ctx) {
            debug!(user_id = ?ctx.user_id(), "Administrator; skipping requirement");
            return Ok(());
        }
        self.check(ctx, requirement)
    }

    pub fn evaluator(&self) -> &PermissionEvaluator {
        &self.evaluator
    }

    pub fn service(&self) -> &AuthorizationService {
        &self.service
    }

    pub fn operations(&self) -> &OperationRequirements {
        &self.operations
    }

    pub fn registry(&self) -> &PermissionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn task_assignee_permission(&self) -> TaskAssigneePermission {
        self.task_assignee_permission
    }
}
