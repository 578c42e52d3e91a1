//! What a business operation requires: leaf checks combined with AND/OR.

use serde::Serialize;
use std::fmt;

use super::errors::AuthzError;
use super::permissions::Permission;
use super::resources::ResourceType;

// ═══════════════════════════════════════════════════════════════════════════════
// Leaf Requirement
// ═══════════════════════════════════════════════════════════════════════════════

/// One permission on one resource.
///
/// `resource_id` is `None` for type-level checks such as creating a process
/// instance, which only wildcard or unscoped entries can satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AuthorizationRequirement {
    pub resource_type: ResourceType,
    pub resource_id: Option<String>,
    pub permission: Permission,
}

impl AuthorizationRequirement {
    pub fn new(
        permission: Permission,
        resource_type: ResourceType,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            resource_type,
            resource_id: Some(resource_id.into()),
            permission,
        }
    }

    pub fn on_type(permission: Permission, resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            resource_id: None,
            permission,
        }
    }
}

impl fmt::Display for AuthorizationRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        MissingAuthorization::from(self).fmt(f)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Composite Requirement
// ═══════════════════════════════════════════════════════════════════════════════

/// An AND/OR tree of leaf requirements.
///
/// An empty `All` or `Any` demands nothing and is always satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeRequirement {
    Leaf(AuthorizationRequirement),
    All(Vec<CompositeRequirement>),
    Any(Vec<CompositeRequirement>),
}

impl CompositeRequirement {
    pub fn leaf(permission: Permission, resource_type: ResourceType, resource_id: impl Into<String>) -> Self {
        Self::Leaf(AuthorizationRequirement::new(permission, resource_type, resource_id))
    }

    pub fn on_type(permission: Permission, resource_type: ResourceType) -> Self {
        Self::Leaf(AuthorizationRequirement::on_type(permission, resource_type))
    }

    /// Nothing required.
    pub fn none() -> Self {
        Self::All(Vec::new())
    }

    pub fn and(self, other: CompositeRequirement) -> Self {
        match self {
            Self::All(mut children) => {
                children.push(other);
                Self::All(children)
            }
            node => Self::All(vec![node, other]),
        }
    }

    pub fn or(self, other: CompositeRequirement) -> Self {
        match self {
            Self::Any(mut children) => {
                children.push(other);
                Self::Any(children)
            }
            node => Self::Any(vec![node, other]),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Leaf(_) => false,
            Self::All(children) | Self::Any(children) => children.iter().all(Self::is_empty),
        }
    }

    /// Every leaf in the tree, depth first.
    pub fn leaves(&self) -> Vec<&AuthorizationRequirement> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a AuthorizationRequirement>) {
        match self {
            Self::Leaf(leaf) => out.push(leaf),
            Self::All(children) | Self::Any(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Evaluate with short-circuiting, using `check` for each leaf.
    ///
    /// An `Any` that fails reports every unmet leaf beneath it; an `All`
    /// stops at, and reports, its first failing child. Errors from `check`
    /// abort evaluation.
    pub fn evaluate<E>(
        &self,
        check: &mut impl FnMut(&AuthorizationRequirement) -> Result<bool, E>,
    ) -> Result<Decision, E> {
        match self {
            Self::Leaf(leaf) => Ok(if check(leaf)? {
                Decision::Granted
            } else {
                Decision::Denied(vec![MissingAuthorization::from(leaf)])
            }),
            Self::All(children) => {
                for child in children {
                    let decision = child.evaluate(&mut *check)?;
                    if decision.is_denied() {
                        return Ok(decision);
                    }
                }
                Ok(Decision::Granted)
            }
            Self::Any(children) => {
                if children.is_empty() {
                    return Ok(Decision::Granted);
                }
                let mut missing = Vec::new();
                for child in children {
                    match child.evaluate(&mut *check)? {
                        Decision::Granted => return Ok(Decision::Granted),
                        Decision::Denied(unmet) => missing.extend(unmet),
                    }
                }
                Ok(Decision::Denied(missing))
            }
        }
    }
}

impl From<AuthorizationRequirement> for CompositeRequirement {
    fn from(leaf: AuthorizationRequirement) -> Self {
        Self::Leaf(leaf)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Builds a flat conjunction or disjunction of leaves.
///
/// ```rust,ignore
/// let requirement = RequirementBuilder::any()
///     .permission(Permissions::READ, Resources::PROCESS_INSTANCE, "pi-1")
///     .permission(Permissions::READ_INSTANCE, Resources::PROCESS_DEFINITION, "invoice")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct RequirementBuilder {
    disjunctive: bool,
    children: Vec<CompositeRequirement>,
}

impl RequirementBuilder {
    pub fn all() -> Self {
        Self {
            disjunctive: false,
            children: Vec::new(),
        }
    }

    pub fn any() -> Self {
        Self {
            disjunctive: true,
            children: Vec::new(),
        }
    }

    pub fn permission(
        mut self,
        permission: Permission,
        resource_type: ResourceType,
        resource_id: impl Into<String>,
    ) -> Self {
        self.children
            .push(CompositeRequirement::leaf(permission, resource_type, resource_id));
        self
    }

    /// Add a leaf when `resource_id` is present; skip it otherwise.
    pub fn permission_if_present(
        self,
        permission: Permission,
        resource_type: ResourceType,
        resource_id: Option<&str>,
    ) -> Self {
        match resource_id {
            Some(id) => self.permission(permission, resource_type, id),
            None => self,
        }
    }

    pub fn type_permission(mut self, permission: Permission, resource_type: ResourceType) -> Self {
        self.children
            .push(CompositeRequirement::on_type(permission, resource_type));
        self
    }

    pub fn nested(mut self, requirement: CompositeRequirement) -> Self {
        self.children.push(requirement);
        self
    }

    pub fn build(self) -> CompositeRequirement {
        match (self.disjunctive, self.children.len()) {
            (_, 1) => self
                .children
                .into_iter()
                .next()
                .unwrap_or_else(CompositeRequirement::none),
            (true, _) => CompositeRequirement::Any(self.children),
            (false, _) => CompositeRequirement::All(self.children),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// An unmet leaf requirement, reported on denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingAuthorization {
    pub permission: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
}

impl MissingAuthorization {
    pub fn new(permission: Permission, resource_type: ResourceType, resource_id: Option<String>) -> Self {
        Self {
            permission: permission.name().to_string(),
            resource_type: resource_type.name().to_string(),
            resource_id,
        }
    }
}

impl From<&AuthorizationRequirement> for MissingAuthorization {
    fn from(req: &AuthorizationRequirement) -> Self {
        Self::new(req.permission, req.resource_type, req.resource_id.clone())
    }
}

impl fmt::Display for MissingAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource_id {
            Some(id) => write!(
                f,
                "'{}' permission on resource '{}' of type '{}'",
                self.permission, id, self.resource_type
            ),
            None => write!(
                f,
                "'{}' permission on resource type '{}'",
                self.permission, self.resource_type
            ),
        }
    }
}

/// Outcome of evaluating a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Granted,
    Denied(Vec<MissingAuthorization>),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }

    pub fn missing(&self) -> &[MissingAuthorization] {
        match self {
            Self::Granted => &[],
            Self::Denied(missing) => missing,
        }
    }

    /// Turn a denial into an error carrying the user id and unmet facts.
    pub fn into_result(self, user_id: &str) -> Result<(), AuthzError> {
        match self {
            Self::Granted => Ok(()),
            Self::Denied(missing) => Err(AuthzError::Denied {
                user_id: user_id.to_string(),
                missing,
            }),
        }
    }
}
