//! Error types for authorization evaluation and entry management.

use thiserror::Error;
use uuid::Uuid;

use super::requirement::MissingAuthorization;

/// Failures raised by the authorization core.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A point or composite check failed.
    #[error("{}", denial_message(.user_id, .missing))]
    Denied {
        user_id: String,
        missing: Vec<MissingAuthorization>,
    },

    #[error("The resource type '{resource_type}' is not valid for '{permission}' permission")]
    InvalidResourceForPermission {
        resource_type: String,
        permission: String,
    },

    #[error("Unknown permission '{name}' for resource type '{resource_type}'")]
    UnknownPermission { resource_type: String, name: String },

    /// Invalid engine configuration, detected while building the engine.
    #[error("{0}")]
    Configuration(String),

    #[error("Invalid authorization entry: {0}")]
    InvalidEntry(String),

    #[error("Authorization entry not found: {0}")]
    EntryNotFound(Uuid),

    /// A single result was requested but several rows matched.
    #[error("Query return {count} results instead of max 1")]
    NotUnique { count: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthzError {
    /// The unmet authorizations carried by a denial, empty otherwise.
    pub fn missing_authorizations(&self) -> &[MissingAuthorization] {
        match self {
            Self::Denied { missing, .. } => missing,
            _ => &[],
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}

fn denial_message(user_id: &str, missing: &[MissingAuthorization]) -> String {
    match missing {
        [single] => format!("The user with id '{}' does not have {}.", user_id, single),
        _ => {
            let alternatives: Vec<String> = missing.iter().map(ToString::to_string).collect();
            format!(
                "The user with id '{}' does not have one of the following permissions: {}",
                user_id,
                alternatives.join(" or ")
            )
        }
    }
}

/// Failures of an [`AuthorizationStore`](super::store::AuthorizationStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Authorization entry not found: {0}")]
    NotFound(Uuid),

    #[error("Authorization entry already exists: {0}")]
    Duplicate(Uuid),

    #[error("Store backend failure: {0}")]
    Backend(String),
}
