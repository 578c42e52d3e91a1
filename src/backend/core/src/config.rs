//! Configuration management.
//!
//! Settings come from an optional file plus `FLOWGUARD_*` environment
//! variables, with `__` separating nested keys:
//!
//! ```text
//! FLOWGUARD__AUTHORIZATION_ENABLED=true
//! FLOWGUARD__DEFAULT_TASK_ASSIGNEE_PERMISSION=TASK_WORK
//! FLOWGUARD__LOGGING__LEVEL=debug
//! ```

use serde::Deserialize;

use crate::telemetry::LoggingConfig;

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Whether checks are enforced for new identity contexts
    #[serde(default)]
    pub authorization_enabled: bool,

    /// Permission names that are never checked
    #[serde(default)]
    pub disabled_permissions: Vec<String>,

    /// Granted to task assignees, owners and candidates on top of `READ`.
    /// Either `UPDATE` or `TASK_WORK`.
    #[serde(default = "default_task_assignee_permission")]
    pub default_task_assignee_permission: Option<String>,

    /// Require the dedicated variable permissions instead of plain read/update
    #[serde(default)]
    pub enforce_specific_variable_permission: bool,

    /// Check history reads against the historic resource types
    #[serde(default)]
    pub enable_historic_instance_permissions: bool,

    /// Users treated as administrators regardless of entries
    #[serde(default)]
    pub admin_users: Vec<String>,

    /// Groups whose members are treated as administrators
    #[serde(default = "default_admin_groups")]
    pub admin_groups: Vec<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            authorization_enabled: false,
            disabled_permissions: Vec::new(),
            default_task_assignee_permission: default_task_assignee_permission(),
            enforce_specific_variable_permission: false,
            enable_historic_instance_permissions: false,
            admin_users: Vec::new(),
            admin_groups: default_admin_groups(),
            logging: LoggingConfig::default(),
        }
    }
}

// Default value functions
fn default_task_assignee_permission() -> Option<String> { Some("UPDATE".to_string()) }
fn default_admin_groups() -> Vec<String> { vec!["camunda-admin".to_string()] }

impl EngineConfig {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(environment())
            .build()?;

        let cfg: EngineConfig = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with the environment layered on top.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(environment())
            .build()?;

        let cfg: EngineConfig = config.try_deserialize()?;
        Ok(cfg)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("FLOWGUARD")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("disabled_permissions")
        .with_list_parse_key("admin_users")
        .with_list_parse_key("admin_groups")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.authorization_enabled);
        assert!(config.disabled_permissions.is_empty());
        assert_eq!(config.default_task_assignee_permission.as_deref(), Some("UPDATE"));
        assert_eq!(config.admin_groups, vec!["camunda-admin".to_string()]);
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let config: EngineConfig = config::Config::builder()
            .set_override("authorization_enabled", true)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert!(config.authorization_enabled);
        assert_eq!(config.default_task_assignee_permission.as_deref(), Some("UPDATE"));
        assert_eq!(config.admin_groups, vec!["camunda-admin".to_string()]);
    }
}
