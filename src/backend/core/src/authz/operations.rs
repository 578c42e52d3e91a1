//! Requirements of the engine's business operations.
//!
//! Most operations can be authorized along more than one route: reading a
//! process instance is allowed with `READ` on the instance itself or with
//! `READ_INSTANCE` on its process definition. Each method here returns the
//! full AND/OR shape so a denial can list every route that was missing.
//!
//! Definitions are addressed by key, instances and tasks by id.

use super::permissions::{
    HistoricProcessInstancePermissions, HistoricTaskPermissions, Permission, Permissions,
    ProcessDefinitionPermissions, ProcessInstancePermissions, TaskPermissions,
};
use super::requirement::{CompositeRequirement, RequirementBuilder};
use super::resources::Resources;

/// Where a task lives, which decides the routes that can authorize it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub id: String,
    /// Key of the process definition for tasks of a process instance.
    pub process_definition_key: Option<String>,
    /// Tasks of a case instance are not subject to checks.
    pub in_case: bool,
}

impl TaskRef {
    pub fn standalone(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            process_definition_key: None,
            in_case: false,
        }
    }

    pub fn in_process(id: impl Into<String>, definition_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            process_definition_key: Some(definition_key.into()),
            in_case: false,
        }
    }

    pub fn in_case(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            process_definition_key: None,
            in_case: true,
        }
    }

    fn definition(&self) -> Option<&str> {
        self.process_definition_key.as_deref()
    }
}

/// Builds operation requirements under the engine's configuration flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationRequirements {
    enforce_specific_variable_permission: bool,
    enable_historic_instance_permissions: bool,
}

impl OperationRequirements {
    pub fn new(
        enforce_specific_variable_permission: bool,
        enable_historic_instance_permissions: bool,
    ) -> Self {
        Self {
            enforce_specific_variable_permission,
            enable_historic_instance_permissions,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Process definitions
    // ─────────────────────────────────────────────────────────────────────────

    pub fn read_process_definition(&self, definition_key: &str) -> CompositeRequirement {
        CompositeRequirement::leaf(Permissions::READ, Resources::PROCESS_DEFINITION, definition_key)
    }

    pub fn update_process_definition(&self, definition_key: &str) -> CompositeRequirement {
        CompositeRequirement::leaf(Permissions::UPDATE, Resources::PROCESS_DEFINITION, definition_key)
    }

    pub fn delete_process_definition(&self, definition_key: &str) -> CompositeRequirement {
        CompositeRequirement::leaf(Permissions::DELETE, Resources::PROCESS_DEFINITION, definition_key)
    }

    pub fn suspend_process_definition(&self, definition_key: &str) -> CompositeRequirement {
        RequirementBuilder::any()
            .permission(
                ProcessDefinitionPermissions::SUSPEND,
                Resources::PROCESS_DEFINITION,
                definition_key,
            )
            .permission(Permissions::UPDATE, Resources::PROCESS_DEFINITION, definition_key)
            .build()
    }

    /// Update a definition together with instances of it: `UPDATE` on the
    /// definition, and either `UPDATE_INSTANCE` on it or `UPDATE` on every
    /// affected instance.
    pub fn update_definition_and_instances(
        &self,
        definition_key: &str,
        instance_ids: &[&str],
    ) -> CompositeRequirement {
        let per_instance = instance_ids.iter().fold(RequirementBuilder::all(), |b, id| {
            b.permission(Permissions::UPDATE, Resources::PROCESS_INSTANCE, *id)
        });
        let instances = RequirementBuilder::any()
            .permission(
                Permissions::UPDATE_INSTANCE,
                Resources::PROCESS_DEFINITION,
                definition_key,
            )
            .nested(per_instance.build())
            .build();

        RequirementBuilder::all()
            .permission(Permissions::UPDATE, Resources::PROCESS_DEFINITION, definition_key)
            .nested(instances)
            .build()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Process instances
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_process_instance(&self, definition_key: &str) -> CompositeRequirement {
        RequirementBuilder::all()
            .type_permission(Permissions::CREATE, Resources::PROCESS_INSTANCE)
            .permission(
                Permissions::CREATE_INSTANCE,
                Resources::PROCESS_DEFINITION,
                definition_key,
            )
            .build()
    }

    pub fn read_process_instance(&self, instance_id: &str, definition_key: &str) -> CompositeRequirement {
        RequirementBuilder::any()
            .permission(Permissions::READ, Resources::PROCESS_INSTANCE, instance_id)
            .permission(Permissions::READ_INSTANCE, Resources::PROCESS_DEFINITION, definition_key)
            .build()
    }

    pub fn update_process_instance(&self, instance_id: &str, definition_key: &str) -> CompositeRequirement {
        RequirementBuilder::any()
            .permission(Permissions::UPDATE, Resources::PROCESS_INSTANCE, instance_id)
            .permission(Permissions::UPDATE_INSTANCE, Resources::PROCESS_DEFINITION, definition_key)
            .build()
    }

    pub fn delete_process_instance(&self, instance_id: &str, definition_key: &str) -> CompositeRequirement {
        RequirementBuilder::any()
            .permission(Permissions::DELETE, Resources::PROCESS_INSTANCE, instance_id)
            .permission(Permissions::DELETE_INSTANCE, Resources::PROCESS_DEFINITION, definition_key)
            .build()
    }

    pub fn suspend_process_instance(&self, instance_id: &str, definition_key: &str) -> CompositeRequirement {
        RequirementBuilder::any()
            .permission(ProcessInstancePermissions::SUSPEND, Resources::PROCESS_INSTANCE, instance_id)
            .permission(
                ProcessDefinitionPermissions::SUSPEND_INSTANCE,
                Resources::PROCESS_DEFINITION,
                definition_key,
            )
            .permission(Permissions::UPDATE, Resources::PROCESS_INSTANCE, instance_id)
            .permission(Permissions::UPDATE_INSTANCE, Resources::PROCESS_DEFINITION, definition_key)
            .build()
    }

    pub fn retry_job(&self, instance_id: &str, definition_key: &str) -> CompositeRequirement {
        RequirementBuilder::any()
            .permission(ProcessInstancePermissions::RETRY_JOB, Resources::PROCESS_INSTANCE, instance_id)
            .permission(
                ProcessDefinitionPermissions::RETRY_JOB,
                Resources::PROCESS_DEFINITION,
                definition_key,
            )
            .permission(Permissions::UPDATE, Resources::PROCESS_INSTANCE, instance_id)
            .permission(Permissions::UPDATE_INSTANCE, Resources::PROCESS_DEFINITION, definition_key)
            .build()
    }

    pub fn migrate_process_instances(&self, source_key: &str, target_key: &str) -> CompositeRequirement {
        RequirementBuilder::all()
            .permission(Permissions::MIGRATE_INSTANCE, Resources::PROCESS_DEFINITION, source_key)
            .permission(Permissions::MIGRATE_INSTANCE, Resources::PROCESS_DEFINITION, target_key)
            .build()
    }

    /// Read variables of a process instance. With specific variable
    /// permissions enforced only `READ_INSTANCE_VARIABLE` on the definition
    /// qualifies.
    pub fn read_process_instance_variable(
        &self,
        instance_id: &str,
        definition_key: &str,
    ) -> CompositeRequirement {
        if self.enforce_specific_variable_permission {
            CompositeRequirement::leaf(
                ProcessDefinitionPermissions::READ_INSTANCE_VARIABLE,
                Resources::PROCESS_DEFINITION,
                definition_key,
            )
        } else {
            self.read_process_instance(instance_id, definition_key)
        }
    }

    pub fn update_process_instance_variable(
        &self,
        instance_id: &str,
        definition_key: &str,
    ) -> CompositeRequirement {
        RequirementBuilder::any()
            .permission(
                ProcessInstancePermissions::UPDATE_VARIABLE,
                Resources::PROCESS_INSTANCE,
                instance_id,
            )
            .permission(
                ProcessDefinitionPermissions::UPDATE_INSTANCE_VARIABLE,
                Resources::PROCESS_DEFINITION,
                definition_key,
            )
            .permission(Permissions::UPDATE, Resources::PROCESS_INSTANCE, instance_id)
            .permission(Permissions::UPDATE_INSTANCE, Resources::PROCESS_DEFINITION, definition_key)
            .build()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tasks
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_task(&self) -> CompositeRequirement {
        CompositeRequirement::on_type(Permissions::CREATE, Resources::TASK)
    }

    pub fn read_task(&self, task: &TaskRef) -> CompositeRequirement {
        if task.in_case {
            return CompositeRequirement::none();
        }
        RequirementBuilder::any()
            .permission(Permissions::READ, Resources::TASK, task.id.as_str())
            .permission_if_present(Permissions::READ_TASK, Resources::PROCESS_DEFINITION, task.definition())
            .build()
    }

    pub fn update_task(&self, task: &TaskRef) -> CompositeRequirement {
        if task.in_case {
            return CompositeRequirement::none();
        }
        RequirementBuilder::any()
            .permission(Permissions::UPDATE, Resources::TASK, task.id.as_str())
            .permission_if_present(Permissions::UPDATE_TASK, Resources::PROCESS_DEFINITION, task.definition())
            .build()
    }

    pub fn delete_task(&self, task: &TaskRef) -> CompositeRequirement {
        if task.in_case {
            return CompositeRequirement::none();
        }
        CompositeRequirement::leaf(Permissions::DELETE, Resources::TASK, task.id.as_str())
    }

    /// Complete, claim or otherwise work on a task.
    pub fn task_work(&self, task: &TaskRef) -> CompositeRequirement {
        self.task_route(task, Permissions::TASK_WORK)
    }

    /// Set the assignee, owner or candidates of a task.
    pub fn task_assign(&self, task: &TaskRef) -> CompositeRequirement {
        self.task_route(task, Permissions::TASK_ASSIGN)
    }

    fn task_route(&self, task: &TaskRef, specific: Permission) -> CompositeRequirement {
        if task.in_case {
            return CompositeRequirement::none();
        }
        RequirementBuilder::any()
            .permission(specific, Resources::TASK, task.id.as_str())
            .permission_if_present(specific, Resources::PROCESS_DEFINITION, task.definition())
            .permission(Permissions::UPDATE, Resources::TASK, task.id.as_str())
            .permission_if_present(Permissions::UPDATE_TASK, Resources::PROCESS_DEFINITION, task.definition())
            .build()
    }

    /// Read task variables. With specific variable permissions enforced the
    /// generic read routes are replaced by `READ_VARIABLE` on the task or
    /// `READ_TASK_VARIABLE` on the definition.
    pub fn read_task_variable(&self, task: &TaskRef) -> CompositeRequirement {
        if task.in_case {
            return CompositeRequirement::none();
        }
        if !self.enforce_specific_variable_permission {
            return self.read_task(task);
        }
        RequirementBuilder::any()
            .permission(TaskPermissions::READ_VARIABLE, Resources::TASK, task.id.as_str())
            .permission_if_present(
                ProcessDefinitionPermissions::READ_TASK_VARIABLE,
                Resources::PROCESS_DEFINITION,
                task.definition(),
            )
            .build()
    }

    pub fn update_task_variable(&self, task: &TaskRef) -> CompositeRequirement {
        if task.in_case {
            return CompositeRequirement::none();
        }
        RequirementBuilder::any()
            .permission(TaskPermissions::UPDATE_VARIABLE, Resources::TASK, task.id.as_str())
            .permission_if_present(
                ProcessDefinitionPermissions::UPDATE_TASK_VARIABLE,
                Resources::PROCESS_DEFINITION,
                task.definition(),
            )
            .permission(Permissions::UPDATE, Resources::TASK, task.id.as_str())
            .permission_if_present(Permissions::UPDATE_TASK, Resources::PROCESS_DEFINITION, task.definition())
            .build()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────────────────

    /// Read a historic process instance: `READ_HISTORY` on the definition,
    /// or `READ` on the historic instance when historic permissions are on.
    pub fn read_historic_process_instance(
        &self,
        instance_id: &str,
        definition_key: &str,
    ) -> CompositeRequirement {
        let builder = RequirementBuilder::any()
            .permission(Permissions::READ_HISTORY, Resources::PROCESS_DEFINITION, definition_key);
        if self.enable_historic_instance_permissions {
            builder
                .permission(
                    HistoricProcessInstancePermissions::READ,
                    Resources::HISTORIC_PROCESS_INSTANCE,
                    instance_id,
                )
                .build()
        } else {
            builder.build()
        }
    }

    pub fn read_historic_task(&self, task_id: &str, definition_key: Option<&str>) -> CompositeRequirement {
        let builder = RequirementBuilder::any().permission_if_present(
            Permissions::READ_HISTORY,
            Resources::PROCESS_DEFINITION,
            definition_key,
        );
        if self.enable_historic_instance_permissions {
            builder
                .permission(HistoricTaskPermissions::READ, Resources::HISTORIC_TASK, task_id)
                .build()
        } else {
            builder.build()
        }
    }

    /// Read historic variables of a task or process instance.
    pub fn read_historic_variable(
        &self,
        definition_key: &str,
        task_id: Option<&str>,
    ) -> CompositeRequirement {
        let on_definition = if self.enforce_specific_variable_permission {
            ProcessDefinitionPermissions::READ_HISTORY_VARIABLE
        } else {
            Permissions::READ_HISTORY
        };
        let builder = RequirementBuilder::any().permission(
            on_definition,
            Resources::PROCESS_DEFINITION,
            definition_key,
        );
        match (self.enable_historic_instance_permissions, task_id) {
            (true, Some(task_id)) => {
                let on_task = if self.enforce_specific_variable_permission {
                    HistoricTaskPermissions::READ_VARIABLE
                } else {
                    HistoricTaskPermissions::READ
                };
                builder
                    .permission(on_task, Resources::HISTORIC_TASK, task_id)
                    .build()
            }
            _ => builder.build(),
        }
    }

    pub fn delete_history(&self, definition_key: &str) -> CompositeRequirement {
        CompositeRequirement::leaf(Permissions::DELETE_HISTORY, Resources::PROCESS_DEFINITION, definition_key)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Administration
    // ─────────────────────────────────────────────────────────────────────────

    /// Managing authorization entries needs `ALL` on the authorization resource.
    pub fn manage_authorizations(&self) -> CompositeRequirement {
        CompositeRequirement::on_type(Permissions::ALL, Resources::AUTHORIZATION)
    }
}
