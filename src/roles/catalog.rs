//! Built-in authorization roles

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Permission that grants every action
pub const WILDCARD_PERMISSION: &str = "*";

const READ_PERMISSIONS: &[&str] = &[
    "command:read",
    "event:read",
    "instance:read",
    "job:read",
    "queue:read",
    "request:read",
    "system:read",
];

/// A named set of permissions.
///
/// `mandatory` is catalog metadata: mandatory roles are verified on every
/// bootstrap, convenience roles only on a fresh install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub permissions: BTreeSet<String>,

    #[serde(default)]
    pub mandatory: bool,
}

impl RoleDefinition {
    pub fn new<I, P>(name: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            name: name.into(),
            description: None,
            permissions: permissions.into_iter().map(Into::into).collect(),
            mandatory: false,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Whether the role grants `permission`, directly or through the wildcard
    pub fn grants(&self, permission: &str) -> bool {
        self.permissions.contains(WILDCARD_PERMISSION) || self.permissions.contains(permission)
    }
}

/// The fixed, ordered set of roles a bootstrap provisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCatalog {
    roles: Vec<RoleDefinition>,
}

impl Default for RoleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RoleCatalog {
    pub fn new(roles: Vec<RoleDefinition>) -> Self {
        Self { roles }
    }

    /// Two convenience roles followed by the three mandatory ones
    pub fn builtin() -> Self {
        let operator_permissions = READ_PERMISSIONS
            .iter()
            .copied()
            .chain(["request:create"]);

        Self::new(vec![
            RoleDefinition::new("readonly", READ_PERMISSIONS.iter().copied())
                .describe("Allows only standard read actions"),
            RoleDefinition::new("operator", operator_permissions)
                .describe("Standard user role: read everything, create requests"),
            RoleDefinition::new("anonymous", READ_PERMISSIONS.iter().copied())
                .describe("Special role used for non-authenticated users")
                .mandatory(),
            RoleDefinition::new("admin", [WILDCARD_PERMISSION])
                .describe("Allows all actions")
                .mandatory(),
            RoleDefinition::new(
                "plugin",
                [
                    "instance:update",
                    "job:create",
                    "job:delete",
                    "job:update",
                    "request:create",
                    "request:read",
                    "request:update",
                    "system:create",
                    "system:read",
                    "system:update",
                ],
            )
            .describe("Allows actions necessary for plugins to function")
            .mandatory(),
        ])
    }

    pub fn roles(&self) -> &[RoleDefinition] {
        &self.roles
    }

    pub fn mandatory(&self) -> impl Iterator<Item = &RoleDefinition> {
        self.roles.iter().filter(|r| r.mandatory)
    }

    pub fn convenience(&self) -> impl Iterator<Item = &RoleDefinition> {
        self.roles.iter().filter(|r| !r.mandatory)
    }

    pub fn find(&self, name: &str) -> Option<&RoleDefinition> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
