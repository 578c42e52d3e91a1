//! Integration tests for the authorization engine.
//!
//! These tests drive the public API end-to-end: engine construction, entry
//! administration, lifecycle events and checks.

use flowguard_core::authz::{
    filter_authorized, EntryFilter, IdentityLink, LinkType, PrincipalChange,
    ProcessDefinitionPermissions, ProcessInstancePermissions, ResourceCreated, TaskPermissions,
};
use flowguard_core::prelude::*;

// ============================================================================
// Test Utilities
// ============================================================================

fn engine() -> AuthorizationEngine {
    engine_with(EngineConfig {
        authorization_enabled: true,
        ..EngineConfig::default()
    })
}

fn engine_with(config: EngineConfig) -> AuthorizationEngine {
    EngineBuilder::new(config).build().unwrap()
}

fn grant(
    engine: &AuthorizationEngine,
    principal: Principal,
    resource_type: ResourceType,
    scope: ResourceScope,
    permission: Permission,
) {
    engine
        .service()
        .bootstrap(vec![
            AuthorizationEntry::grant(principal, resource_type, scope).with_permission(permission),
        ])
        .unwrap();
}

fn groups(ids: &[&str]) -> Option<Vec<String>> {
    Some(ids.iter().map(|g| g.to_string()).collect())
}

// ============================================================================
// Core Properties
// ============================================================================

#[test]
fn test_grant_enables() {
    let engine = engine();
    let ctx = engine.identity("demo", None);
    let req = CompositeRequirement::leaf(Permissions::READ, Resources::TASK, "task-1");
    assert!(!engine.is_authorized(&ctx, &req).unwrap());

    grant(
        &engine,
        Principal::user("demo"),
        Resources::TASK,
        ResourceScope::instance("task-1"),
        Permissions::READ,
    );
    assert!(engine.is_authorized(&ctx, &req).unwrap());
}

#[test]
fn test_wildcard_grant_covers_every_instance() {
    let engine = engine();
    grant(
        &engine,
        Principal::user("demo"),
        Resources::PROCESS_INSTANCE,
        ResourceScope::Any,
        Permissions::READ,
    );
    let ctx = engine.identity("demo", None);
    for id in ["pi-1", "pi-2", "anything"] {
        let req = CompositeRequirement::leaf(Permissions::READ, Resources::PROCESS_INSTANCE, id);
        assert!(engine.is_authorized(&ctx, &req).unwrap());
    }
    // Other types are unaffected.
    let task = CompositeRequirement::leaf(Permissions::READ, Resources::TASK, "pi-1");
    assert!(!engine.is_authorized(&ctx, &task).unwrap());
}

#[test]
fn test_revoke_overrides_wildcard_for_one_resource() {
    let engine = engine();
    engine
        .service()
        .bootstrap(vec![
            AuthorizationEntry::grant(
                Principal::user("demo"),
                Resources::PROCESS_DEFINITION,
                ResourceScope::Any,
            )
            .with_permission(Permissions::ALL),
            AuthorizationEntry::revoke(
                Principal::user("demo"),
                Resources::PROCESS_DEFINITION,
                ResourceScope::instance("invoice"),
            )
            .with_permission(Permissions::READ),
        ])
        .unwrap();

    let ctx = engine.identity("demo", None);
    let ops = engine.operations();
    assert!(!engine.is_authorized(&ctx, &ops.read_process_definition("invoice")).unwrap());
    assert!(engine.is_authorized(&ctx, &ops.update_process_definition("invoice")).unwrap());
    assert!(engine.is_authorized(&ctx, &ops.read_process_definition("order")).unwrap());
}

#[test]
fn test_revoke_beats_grant_at_every_level() {
    let engine = engine();
    engine
        .service()
        .bootstrap(vec![
            AuthorizationEntry::grant(
                Principal::user("demo"),
                Resources::TASK,
                ResourceScope::instance("task-1"),
            )
            .with_permission(Permissions::READ),
            AuthorizationEntry::revoke(Principal::group("sales"), Resources::TASK, ResourceScope::Any)
                .with_permission(Permissions::READ),
        ])
        .unwrap();

    // The more specific user grant does not win over the group-wide revoke.
    let ctx = engine.identity("demo", groups(&["sales"]));
    let req = CompositeRequirement::leaf(Permissions::READ, Resources::TASK, "task-1");
    assert!(!engine.is_authorized(&ctx, &req).unwrap());

    let outside = engine.identity("demo", None);
    assert!(engine.is_authorized(&outside, &req).unwrap());
}

#[test]
fn test_global_entry_applies_to_everyone() {
    let engine = engine();
    engine
        .service()
        .bootstrap(vec![AuthorizationEntry::global(Resources::FILTER, ResourceScope::Any)
            .with_permission(Permissions::READ)])
        .unwrap();
    let ctx = engine.identity("anyone", None);
    let req = CompositeRequirement::leaf(Permissions::READ, Resources::FILTER, "my-tasks");
    assert!(engine.is_authorized(&ctx, &req).unwrap());
}

#[test]
fn test_any_group_is_enough_and_no_groups_means_none() {
    let engine = engine();
    grant(
        &engine,
        Principal::group("accounting"),
        Resources::DEPLOYMENT,
        ResourceScope::instance("dep-1"),
        Permissions::READ,
    );
    let req = CompositeRequirement::leaf(Permissions::READ, Resources::DEPLOYMENT, "dep-1");

    let member = engine.identity("demo", groups(&["sales", "accounting"]));
    assert!(engine.is_authorized(&member, &req).unwrap());

    let no_groups = engine.identity("demo", None);
    assert!(!engine.is_authorized(&no_groups, &req).unwrap());

    let empty_groups = engine.identity("demo", groups(&[]));
    assert!(!engine.is_authorized(&empty_groups, &req).unwrap());
}

#[test]
fn test_composite_or_names_every_missing_fact() {
    let engine = engine();
    let ctx = engine.identity("demo", None);
    let req = engine.operations().read_process_instance("pi-1", "invoice");

    let err = engine.check(&ctx, &req).unwrap_err();
    let message = err.user_message();
    assert!(message.contains("'demo'"));
    assert!(message.contains("'READ' permission on resource 'pi-1' of type 'ProcessInstance'"));
    assert!(message.contains("'READ_INSTANCE' permission on resource 'invoice' of type 'ProcessDefinition'"));
    let missing = err.authz().map(|e| e.missing_authorizations().len());
    assert_eq!(missing, Some(2));

    // Either route alone is enough.
    grant(
        &engine,
        Principal::user("demo"),
        Resources::PROCESS_DEFINITION,
        ResourceScope::instance("invoice"),
        Permissions::READ_INSTANCE,
    );
    engine.check(&ctx, &req).unwrap();
}

#[test]
fn test_enforcement_override_restores_prior_behavior() {
    let engine = engine();
    let ctx = engine.identity("demo", None);
    let req = CompositeRequirement::leaf(Permissions::DELETE, Resources::TASK, "task-1");
    assert!(!engine.is_authorized(&ctx, &req).unwrap());

    {
        let _guard = ctx.override_enforcement(false);
        assert!(engine.is_authorized(&ctx, &req).unwrap());
        engine.check(&ctx, &engine.operations().manage_authorizations()).unwrap();
    }
    assert!(ctx.is_enforced());
    assert!(!engine.is_authorized(&ctx, &req).unwrap());

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        ctx.without_enforcement(|| panic!("command failed"))
    }));
    assert!(result.is_err());
    assert!(ctx.is_enforced());
}

#[test]
fn test_disabled_permission_bypasses_every_type() {
    let engine = engine_with(EngineConfig {
        authorization_enabled: true,
        disabled_permissions: vec!["READ".to_string()],
        ..EngineConfig::default()
    });
    let ctx = engine.identity("demo", None);
    for resource_type in [Resources::TASK, Resources::PROCESS_DEFINITION, Resources::HISTORIC_TASK] {
        let req = CompositeRequirement::leaf(Permissions::READ, resource_type, "x");
        assert!(engine.is_authorized(&ctx, &req).unwrap());
    }
    let update = CompositeRequirement::leaf(Permissions::UPDATE, Resources::TASK, "x");
    assert!(!engine.is_authorized(&ctx, &update).unwrap());
}

#[test]
fn test_disabling_a_shared_name_bypasses_it_on_every_type() {
    let engine = engine_with(EngineConfig {
        authorization_enabled: true,
        disabled_permissions: vec!["SUSPEND".to_string(), "UPDATE_VARIABLE".to_string()],
        ..EngineConfig::default()
    });
    let ctx = engine.identity("demo", None);
    let bypassed = [
        CompositeRequirement::leaf(
            ProcessDefinitionPermissions::SUSPEND,
            Resources::PROCESS_DEFINITION,
            "invoice",
        ),
        CompositeRequirement::leaf(ProcessInstancePermissions::SUSPEND, Resources::PROCESS_INSTANCE, "pi-1"),
        CompositeRequirement::leaf(TaskPermissions::UPDATE_VARIABLE, Resources::TASK, "task-1"),
        CompositeRequirement::leaf(
            ProcessInstancePermissions::UPDATE_VARIABLE,
            Resources::PROCESS_INSTANCE,
            "pi-1",
        ),
    ];
    for req in &bypassed {
        assert!(engine.is_authorized(&ctx, req).unwrap(), "{req:?} should be bypassed");
    }
    let read = CompositeRequirement::leaf(Permissions::READ, Resources::PROCESS_INSTANCE, "pi-1");
    assert!(!engine.is_authorized(&ctx, &read).unwrap());
}

#[test]
fn test_disabling_unknown_permission_fails_construction() {
    let err = EngineBuilder::new(EngineConfig {
        disabled_permissions: vec!["NOT_A_PERMISSION".to_string()],
        ..EngineConfig::default()
    })
    .build()
    .unwrap_err();
    assert!(err.user_message().contains("Permission 'NOT_A_PERMISSION' is invalid"));
}

#[test]
fn test_permission_on_foreign_resource_type_is_rejected() {
    let engine = engine();
    let ctx = engine.identity("demo", None);
    let req = CompositeRequirement::leaf(Permissions::TASK_WORK, Resources::DEPLOYMENT, "dep-1");
    let err = engine.check(&ctx, &req).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidResourceForPermission);
}

#[test]
fn test_permission_sharing_a_bit_with_a_valid_one_is_rejected() {
    let engine = engine();
    let ctx = engine.identity("demo", None);
    grant(
        &engine,
        Principal::user("demo"),
        Resources::TASK,
        ResourceScope::Any,
        TaskPermissions::UPDATE_VARIABLE,
    );

    // ACCESS is bit 32 like the task's UPDATE_VARIABLE, but is not a task permission.
    let access = CompositeRequirement::leaf(Permissions::ACCESS, Resources::TASK, "task-1");
    let err = engine.check(&ctx, &access).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidResourceForPermission);

    let update_variable =
        CompositeRequirement::leaf(TaskPermissions::UPDATE_VARIABLE, Resources::TASK, "task-1");
    assert!(engine.is_authorized(&ctx, &update_variable).unwrap());
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_resource_deletion_leaves_no_entries_behind() {
    let engine = engine();
    let service = engine.service();
    grant(
        &engine,
        Principal::group("sales"),
        Resources::TASK,
        ResourceScope::Any,
        Permissions::READ,
    );

    let mut tx = service.begin();
    service
        .resource_created(
            &mut tx,
            &ResourceCreated {
                resource: ResourceRef::new(Resources::TASK, "task-1"),
                principal: Some(Principal::user("creator")),
            },
        )
        .unwrap();
    service
        .identity_link_added(
            &mut tx,
            &IdentityLink {
                resource: ResourceRef::new(Resources::TASK, "task-1"),
                principal: Principal::group("reviewers"),
                link_type: LinkType::Candidate,
            },
        )
        .unwrap();
    tx.commit().unwrap();

    let instance_entries = || {
        engine
            .evaluator()
            .store()
            .find(&EntryFilter::new().scope(ResourceScope::instance("task-1")))
            .unwrap()
    };
    assert_eq!(instance_entries().len(), 2);

    // A rolled back delete changes nothing.
    let mut tx = service.begin();
    service
        .resource_deleted(&mut tx, &ResourceRef::new(Resources::TASK, "task-1"))
        .unwrap();
    tx.rollback();
    assert_eq!(instance_entries().len(), 2);

    let mut tx = service.begin();
    service
        .resource_deleted(&mut tx, &ResourceRef::new(Resources::TASK, "task-1"))
        .unwrap();
    tx.commit().unwrap();
    assert!(instance_entries().is_empty());

    // The wildcard entry survives.
    let ctx = engine.identity("demo", groups(&["sales"]));
    let req = CompositeRequirement::leaf(Permissions::READ, Resources::TASK, "task-2");
    assert!(engine.is_authorized(&ctx, &req).unwrap());
}

#[test]
fn test_reassignment_moves_default_entry() {
    let engine = engine();
    let service = engine.service();
    let task = ResourceRef::new(Resources::TASK, "task-1");

    let assign = |old: Option<&str>, new: Option<&str>| {
        let mut tx = service.begin();
        service
            .principal_changed(
                &mut tx,
                &PrincipalChange {
                    resource: task.clone(),
                    link_type: LinkType::Assignee,
                    old: old.map(Principal::user),
                    new: new.map(Principal::user),
                },
            )
            .unwrap();
        tx.commit().unwrap();
    };

    assign(None, Some("alice"));
    assign(Some("alice"), Some("bob"));

    let entries = engine
        .evaluator()
        .store()
        .find(&EntryFilter::new().resource_type(Resources::TASK))
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id(), Some("bob"));

    let bob = engine.identity("bob", None);
    let alice = engine.identity("alice", None);
    let work = engine.operations().update_task(&TaskRef::standalone("task-1"));
    assert!(engine.is_authorized(&bob, &work).unwrap());
    assert!(!engine.is_authorized(&alice, &work).unwrap());
}

#[test]
fn test_task_work_assignee_permission() {
    let engine = engine_with(EngineConfig {
        authorization_enabled: true,
        default_task_assignee_permission: Some("TASK_WORK".to_string()),
        ..EngineConfig::default()
    });
    let service = engine.service();
    let mut tx = service.begin();
    service
        .principal_changed(
            &mut tx,
            &PrincipalChange {
                resource: ResourceRef::new(Resources::TASK, "task-1"),
                link_type: LinkType::Assignee,
                old: None,
                new: Some(Principal::user("alice")),
            },
        )
        .unwrap();
    tx.commit().unwrap();

    let alice = engine.identity("alice", None);
    let work = CompositeRequirement::leaf(Permissions::TASK_WORK, Resources::TASK, "task-1");
    let update = CompositeRequirement::leaf(Permissions::UPDATE, Resources::TASK, "task-1");
    assert!(engine.is_authorized(&alice, &work).unwrap());
    assert!(!engine.is_authorized(&alice, &update).unwrap());
}

// ============================================================================
// Administration
// ============================================================================

#[test]
fn test_admin_api_requires_all_on_authorization() {
    let engine = engine();
    let service = engine.service();
    let entry = AuthorizationEntry::grant(
        Principal::user("demo"),
        Resources::TASK,
        ResourceScope::instance("task-1"),
    )
    .with_permission(Permissions::READ);

    let demo = engine.identity("demo", None);
    let err = service.create_entry(&demo, entry.clone()).unwrap_err();
    assert!(err.is_denied());

    service.bootstrap_administrator(Principal::user("admin")).unwrap();
    let admin = engine.identity("admin", None);
    service.create_entry(&admin, entry).unwrap();

    let found = service
        .query(&admin, &EntryQuery::new().user_id_in(["demo"]).resource_type(Resources::TASK))
        .unwrap();
    assert_eq!(found.len(), 1);
}

// ============================================================================
// Statistics Scenario
// ============================================================================

struct InstanceRow {
    id: &'static str,
    definition_key: &'static str,
    failed_jobs: usize,
    incidents: usize,
}

fn instances() -> Vec<InstanceRow> {
    ["pi-1", "pi-2", "pi-3"]
        .into_iter()
        .map(|id| InstanceRow {
            id,
            definition_key: "process",
            failed_jobs: 1,
            incidents: 1,
        })
        .collect()
}

/// Visible instances, failed jobs and incidents of definition `process`.
fn statistics(engine: &AuthorizationEngine, ctx: &IdentityContext) -> (usize, usize, usize) {
    let ops = *engine.operations();
    let visible = filter_authorized(engine.evaluator(), ctx, instances(), |row| {
        ops.read_process_instance(row.id, row.definition_key)
    })
    .unwrap();
    (
        visible.len(),
        visible.iter().map(|r| r.failed_jobs).sum(),
        visible.iter().map(|r| r.incidents).sum(),
    )
}

#[test]
fn test_statistics_read_on_definition_alone_shows_nothing() {
    let engine = engine();
    grant(
        &engine,
        Principal::user("demo"),
        Resources::PROCESS_DEFINITION,
        ResourceScope::instance("process"),
        Permissions::READ,
    );
    let ctx = engine.identity("demo", None);
    assert_eq!(statistics(&engine, &ctx), (0, 0, 0));

    grant(
        &engine,
        Principal::user("demo"),
        Resources::PROCESS_INSTANCE,
        ResourceScope::Any,
        Permissions::READ,
    );
    assert_eq!(statistics(&engine, &ctx), (3, 3, 3));
}

#[test]
fn test_statistics_read_instance_on_definition_is_enough() {
    let engine = engine();
    grant(
        &engine,
        Principal::user("demo"),
        Resources::PROCESS_DEFINITION,
        ResourceScope::instance("process"),
        Permissions::READ_INSTANCE,
    );
    let ctx = engine.identity("demo", None);
    assert_eq!(statistics(&engine, &ctx), (3, 3, 3));
}

// ============================================================================
// Configuration Diagnostics
// ============================================================================

#[test]
fn test_invalid_task_assignee_permission() {
    let err = EngineBuilder::new(EngineConfig {
        default_task_assignee_permission: Some("invalidPermission".to_string()),
        ..EngineConfig::default()
    })
    .build()
    .unwrap_err();
    assert!(err.user_message().contains("Permission 'invalidPermission' is invalid"));
}

#[test]
fn test_null_task_assignee_permission() {
    let err = EngineBuilder::new(EngineConfig {
        default_task_assignee_permission: None,
        ..EngineConfig::default()
    })
    .build()
    .unwrap_err();
    assert!(err.user_message().contains("Default task assignee permission is null"));
}
