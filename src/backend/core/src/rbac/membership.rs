//! Member management guard for department membership routes.
//!
//! Runs after the matrix check. Inviting reads the granted role from the
//! body; removal uses the target member's current assignment.

use std::str::FromStr;

use serde_json::Value;
use tracing::warn;

use super::context::RequestContext;
use super::models::{DepartmentId, Role, UserId};
use super::policy::PolicyEngine;
use crate::error::{GateError, Result};

/// Path parameter naming the member a route targets.
pub const MEMBER_PARAM: &str = "userId";

/// Body field carrying the role being granted.
pub const ROLE_KEY: &str = "role";

#[derive(Clone)]
pub struct MembershipGuard {
    engine: PolicyEngine,
}

impl MembershipGuard {
    pub fn new(engine: PolicyEngine) -> Self {
        Self { engine }
    }

    pub async fn check(&self, ctx: &mut RequestContext) -> Result<()> {
        let Some(user) = ctx.user.clone() else {
            return Err(GateError::unauthenticated());
        };
        if self.engine.is_owner(&user) {
            return Ok(());
        }

        let department_id = match ctx.resolved_department() {
            Some(department_id) => department_id,
            None => ctx.param_department()?.ok_or_else(GateError::context_unresolvable)?,
        };
        let target_role = self.target_role(ctx, department_id).await?;

        if !self
            .engine
            .can_manage_department_members(&user, department_id, target_role)
            .await?
        {
            warn!(
                user_id = %user.id,
                department_id = %department_id,
                target_role = %target_role,
                "Member management denied"
            );
            return Err(GateError::permission_denied(format!(
                "You do not have permission to manage {} members of this department",
                target_role
            )));
        }
        Ok(())
    }

    async fn target_role(&self, ctx: &RequestContext, department_id: DepartmentId) -> Result<Role> {
        if let Some(raw_id) = ctx.params.get(MEMBER_PARAM) {
            let member_id = UserId::from_str(raw_id).map_err(|_| GateError::not_found("Member", raw_id.as_str()))?;
            return self
                .engine
                .role_of(member_id, department_id)
                .await?
                .ok_or_else(|| GateError::not_found("Member", raw_id.as_str()));
        }

        match ctx.body.get(ROLE_KEY) {
            Some(Value::String(raw)) => {
                Role::parse(raw).ok_or_else(|| GateError::validation("role must be ADMIN or VIEWER"))
            }
            None | Some(Value::Null) => Err(GateError::validation("role is required")),
            Some(_) => Err(GateError::validation("role must be a string")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::error::ErrorCode;
    use crate::rbac::context::DEPARTMENT_KEY;
    use crate::rbac::models::{AuthUser, OrganizationId, RoleAssignment};
    use crate::rbac::roles::PermissionMatrix;
    use crate::rbac::store::InMemoryDirectory;

    fn guard(directory: &InMemoryDirectory) -> MembershipGuard {
        MembershipGuard::new(PolicyEngine::new(
            Arc::new(directory.clone()),
            Arc::new(PermissionMatrix::defaults()),
        ))
    }

    fn admin_of(directory: &InMemoryDirectory, dept: DepartmentId) -> AuthUser {
        let user = AuthUser::new(UserId::new(), OrganizationId::new());
        directory.assign(RoleAssignment::new(user.id, dept, Role::Admin));
        user
    }

    fn invite(user: AuthUser, dept: DepartmentId, role: &str) -> RequestContext {
        RequestContext::new(Some(user))
            .with_param(DEPARTMENT_KEY, dept.to_string())
            .with_body(json!({ "userId": UserId::new().to_string(), "role": role }))
    }

    #[tokio::test]
    async fn test_admin_invites_viewers_only() {
        let directory = InMemoryDirectory::new();
        let dept = DepartmentId::new();
        let admin = admin_of(&directory, dept);

        guard(&directory).check(&mut invite(admin.clone(), dept, "VIEWER")).await.unwrap();

        let err = guard(&directory).check(&mut invite(admin, dept, "ADMIN")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert!(err.user_message().contains("ADMIN members"));
    }

    #[tokio::test]
    async fn test_owner_grants_admin() {
        let directory = InMemoryDirectory::new();
        let owner = AuthUser::owner(UserId::new(), OrganizationId::new());
        guard(&directory)
            .check(&mut invite(owner, DepartmentId::new(), "ADMIN"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_removal_uses_current_assignment() {
        let directory = InMemoryDirectory::new();
        let dept = DepartmentId::new();
        let admin = admin_of(&directory, dept);
        let fellow_admin = admin_of(&directory, dept);
        let viewer = UserId::new();
        directory.assign(RoleAssignment::new(viewer, dept, Role::Viewer));

        let remove = |target: UserId| {
            RequestContext::new(Some(admin.clone()))
                .with_param(DEPARTMENT_KEY, dept.to_string())
                .with_param(MEMBER_PARAM, target.to_string())
        };

        guard(&directory).check(&mut remove(viewer)).await.unwrap();

        let err = guard(&directory).check(&mut remove(fellow_admin.id)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);

        let err = guard(&directory).check(&mut remove(UserId::new())).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResourceNotFound);
    }

    #[tokio::test]
    async fn test_invite_requires_a_valid_role() {
        let directory = InMemoryDirectory::new();
        let dept = DepartmentId::new();
        let admin = admin_of(&directory, dept);

        let err = guard(&directory).check(&mut invite(admin.clone(), dept, "ROOT")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let mut missing = RequestContext::new(Some(admin)).with_param(DEPARTMENT_KEY, dept.to_string());
        let err = guard(&directory).check(&mut missing).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }
}
