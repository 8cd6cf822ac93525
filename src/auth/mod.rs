//! Authorization collaborator consulted before privileged operations.
//!
//! Authentication is done upstream; by the time a call reaches a service the
//! caller is an [`Actor`] and the only question is whether it may act.

pub mod permissions;
pub mod rbac;

use async_trait::async_trait;
use tracing::warn;

use crate::context::Actor;
use crate::errors::ServiceError;

pub use permissions::consts;
pub use rbac::RoleAuthorizer;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// `action` is a permission string such as `purchaseorders:send`,
    /// `resource` identifies the record being acted on.
    async fn can_perform(&self, actor: &Actor, action: &str, resource: &str) -> bool;
}

/// Grants everything. Used when no gateway roles are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn can_perform(&self, _actor: &Actor, _action: &str, _resource: &str) -> bool {
        true
    }
}

/// Fails with `Unauthorized` unless `authorizer` grants `action` on `resource`.
pub async fn ensure_allowed(
    authorizer: &dyn Authorizer,
    actor: &Actor,
    action: &str,
    resource: &str,
) -> Result<(), ServiceError> {
    if authorizer.can_perform(actor, action, resource).await {
        return Ok(());
    }
    warn!(actor = %actor.id, action, resource, "Permission denied");
    Err(ServiceError::Unauthorized {
        actor: actor.id.clone(),
        action: action.to_string(),
    })
}
