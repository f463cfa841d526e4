use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use super::principal::Principal;
use crate::database::models::{Role, User};
use crate::database::RoleRepository;
use crate::error::ApiError;

/// Access policy attached to a route
#[derive(Debug, Clone, Copy)]
pub enum Policy {
    Authenticated,
    Activated,
    Role(&'static str),
    AnyRole(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
enum Check {
    Authenticated,
    Activated,
    Role(&'static str),
    AnyRole(&'static [&'static str]),
}

impl Policy {
    /// Each policy implies the ones before it.
    fn checks(&self) -> Vec<Check> {
        match *self {
            Policy::Authenticated => vec![Check::Authenticated],
            Policy::Activated => vec![Check::Authenticated, Check::Activated],
            Policy::Role(name) => vec![Check::Authenticated, Check::Activated, Check::Role(name)],
            Policy::AnyRole(names) => vec![Check::Authenticated, Check::Activated, Check::AnyRole(names)],
        }
    }
}

/// Load the role behind a user's role ID. Any failure here, a missing role
/// included, is a server error rather than a denial.
async fn role_of(roles: &dyn RoleRepository, user: &User) -> Result<Role, ApiError> {
    roles
        .get(user.role_id)
        .await
        .map_err(|e| ApiError::internal(format!("loading role {} for user {}: {}", user.role_id, user.id, e)))
}

pub async fn authorize(policy: Policy, principal: &Principal, roles: &dyn RoleRepository) -> Result<(), ApiError> {
    for check in policy.checks() {
        let user = principal.user().ok_or_else(ApiError::authentication_required)?;

        match check {
            Check::Authenticated => {}
            Check::Activated => {
                if !user.is_active {
                    return Err(ApiError::inactive_account());
                }
            }
            Check::Role(name) => {
                let role = role_of(roles, user).await?;
                if role.role_name != name {
                    debug!(user_id = user.id, role = %role.role_name, required = name, "Role check failed");
                    return Err(ApiError::not_permitted());
                }
            }
            Check::AnyRole(names) => {
                let role = role_of(roles, user).await?;
                if !names.contains(&role.role_name.as_str()) {
                    debug!(user_id = user.id, role = %role.role_name, "Role set check failed");
                    return Err(ApiError::not_permitted());
                }
            }
        }
    }
    Ok(())
}

/// Allowed when the principal owns the resource or holds a privileged role.
pub async fn ensure_self_or_role(
    principal: &Principal,
    owner_id: i64,
    privileged: &[&str],
    roles: &dyn RoleRepository,
) -> Result<(), ApiError> {
    let user = principal.user().ok_or_else(ApiError::authentication_required)?;
    if user.id == owner_id {
        return Ok(());
    }

    let role = role_of(roles, user).await?;
    if privileged.contains(&role.role_name.as_str()) {
        return Ok(());
    }
    Err(ApiError::not_permitted())
}

/// Per-route guard state: the policy plus where roles come from
#[derive(Clone)]
pub struct Gate {
    roles: Arc<dyn RoleRepository>,
    policy: Policy,
}

impl Gate {
    pub fn new(roles: Arc<dyn RoleRepository>, policy: Policy) -> Self {
        Self { roles, policy }
    }
}

/// Single dispatcher for every guarded route
pub async fn enforce(
    State(gate): State<Gate>,
    principal: Principal,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(gate.policy, &principal, gate.roles.as_ref()).await?;
    Ok(next.run(request).await)
}
