/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Maps the roles carried on an [`Actor`] to procurement permissions.
 */

use async_trait::async_trait;
use lazy_static::lazy_static;
use std::collections::HashMap;
use tracing::warn;

use super::permissions::permission_matches;
use super::Authorizer;
use crate::context::Actor;

/// Role definition with associated permissions
#[derive(Debug, Clone)]
pub struct Role {
    pub name: String,
    pub description: String,
    pub permissions: Vec<String>,
}

impl Role {
    fn new(name: &str, description: &str, permissions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }
}

// Define standard roles and their permissions
lazy_static! {
    pub static ref ROLES: HashMap<String, Role> = {
        let mut roles = HashMap::new();

        roles.insert(
            "admin".to_string(),
            Role::new("admin", "Administrator with full access", &["*"]),
        );

        // Buyer: owns purchase orders and the supplier list
        roles.insert(
            "buyer".to_string(),
            Role::new(
                "buyer",
                "Creates, sends and cancels purchase orders",
                &["purchaseorders:*", "suppliers:*"],
            ),
        );

        // Warehouse staff
        roles.insert(
            "receiver".to_string(),
            Role::new(
                "receiver",
                "Receives shipments against sent orders",
                &["purchaseorders:receive", "receipts:*"],
            ),
        );

        roles.insert(
            "accountant".to_string(),
            Role::new(
                "accountant",
                "Registers supplier invoices and records payments",
                &["invoices:*", "payables:*"],
            ),
        );

        roles
    };
}

/// Authorizer backed by a static role table.
#[derive(Debug, Clone)]
pub struct RoleAuthorizer {
    roles: HashMap<String, Role>,
}

impl RoleAuthorizer {
    pub fn new(roles: HashMap<String, Role>) -> Self {
        Self { roles }
    }

    pub fn with_defaults() -> Self {
        Self::new(ROLES.clone())
    }

    pub fn permissions_for<'a>(&'a self, actor: &'a Actor) -> impl Iterator<Item = &'a str> + 'a {
        actor.roles.iter().flat_map(move |role_name| {
            let role = self.roles.get(role_name);
            if role.is_none() {
                warn!(actor = %actor.id, role = %role_name, "Role not found");
            }
            role.into_iter()
                .flat_map(|role| role.permissions.iter().map(String::as_str))
        })
    }
}

impl Default for RoleAuthorizer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl Authorizer for RoleAuthorizer {
    async fn can_perform(&self, actor: &Actor, action: &str, _resource: &str) -> bool {
        self.permissions_for(actor)
            .any(|granted| permission_matches(granted, action))
    }
}
