//! Resource types that can carry authorization entries.
//!
//! A resource type is a named category of engine-managed entity (task,
//! process instance, deployment, ...). The numeric id is what gets stored on
//! an [`AuthorizationEntry`](super::entry::AuthorizationEntry); the name is what
//! shows up in diagnostics.

use serde::{Serialize, Serializer};
use std::fmt;

/// Wildcard resource id matching every instance of a resource type.
pub const ANY: &str = "*";

// ═══════════════════════════════════════════════════════════════════════════════
// Resource Type
// ═══════════════════════════════════════════════════════════════════════════════

/// A named category of resources, identified by a stable numeric id.
///
/// Plugins may define additional resource types as constants and register
/// permissions for them with the
/// [`PermissionRegistry`](super::permissions::PermissionRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceType {
    id: u32,
    name: &'static str,
}

impl ResourceType {
    pub const fn new(id: u32, name: &'static str) -> Self {
        Self { id, name }
    }

    pub const fn id(&self) -> u32 {
        self.id
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl Serialize for ResourceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Built-in Resources
// ═══════════════════════════════════════════════════════════════════════════════

/// The resource types known to the engine out of the box.
pub struct Resources;

impl Resources {
    pub const APPLICATION: ResourceType = ResourceType::new(0, "Application");
    pub const USER: ResourceType = ResourceType::new(1, "User");
    pub const GROUP: ResourceType = ResourceType::new(2, "Group");
    pub const GROUP_MEMBERSHIP: ResourceType = ResourceType::new(3, "GroupMembership");
    pub const AUTHORIZATION: ResourceType = ResourceType::new(4, "Authorization");
    pub const FILTER: ResourceType = ResourceType::new(5, "Filter");
    pub const PROCESS_DEFINITION: ResourceType = ResourceType::new(6, "ProcessDefinition");
    pub const TASK: ResourceType = ResourceType::new(7, "Task");
    pub const PROCESS_INSTANCE: ResourceType = ResourceType::new(8, "ProcessInstance");
    pub const DEPLOYMENT: ResourceType = ResourceType::new(9, "Deployment");
    pub const DECISION_DEFINITION: ResourceType = ResourceType::new(10, "DecisionDefinition");
    pub const TENANT: ResourceType = ResourceType::new(11, "Tenant");
    pub const TENANT_MEMBERSHIP: ResourceType = ResourceType::new(12, "TenantMembership");
    pub const BATCH: ResourceType = ResourceType::new(13, "Batch");
    pub const DECISION_REQUIREMENTS_DEFINITION: ResourceType =
        ResourceType::new(14, "DecisionRequirementsDefinition");
    pub const HISTORIC_TASK: ResourceType = ResourceType::new(19, "HistoricTask");
    pub const HISTORIC_PROCESS_INSTANCE: ResourceType =
        ResourceType::new(20, "HistoricProcessInstance");
    pub const SYSTEM: ResourceType = ResourceType::new(21, "System");

    /// All built-in resource types, in id order.
    pub fn all() -> Vec<ResourceType> {
        vec![
            Self::APPLICATION,
            Self::USER,
            Self::GROUP,
            Self::GROUP_MEMBERSHIP,
            Self::AUTHORIZATION,
            Self::FILTER,
            Self::PROCESS_DEFINITION,
            Self::TASK,
            Self::PROCESS_INSTANCE,
            Self::DEPLOYMENT,
            Self::DECISION_DEFINITION,
            Self::TENANT,
            Self::TENANT_MEMBERSHIP,
            Self::BATCH,
            Self::DECISION_REQUIREMENTS_DEFINITION,
            Self::HISTORIC_TASK,
            Self::HISTORIC_PROCESS_INSTANCE,
            Self::SYSTEM,
        ]
    }

    /// Look up a built-in resource type by its numeric id.
    pub fn by_id(id: u32) -> Option<ResourceType> {
        Self::all().into_iter().find(|r| r.id() == id)
    }
}
