//! Generic permission guard driven by declared endpoint requirements.

use std::collections::HashMap;

use axum::http::Method;
use tracing::{debug, warn};

use super::context::{ContextResolver, RequestContext};
use super::models::{Action, Permission, Resource};
use super::policy::PolicyEngine;
use crate::error::{GateError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Requirement registry
// ═══════════════════════════════════════════════════════════════════════════════

/// A route as matched by the router, e.g. `PATCH /tasks/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub method: Method,
    pub route: String,
}

impl Endpoint {
    pub fn new(method: Method, route: impl Into<String>) -> Self {
        Self {
            method,
            route: route.into(),
        }
    }
}

/// Row-level check run after the matrix check passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCheck {
    /// Viewers may only read tasks they created or are assigned to.
    TaskRead,
    /// Create in a department the caller administers, or modify a task the
    /// caller may modify.
    TaskWrite,
    /// The caller may grant or revoke the target member's role.
    Membership,
}

/// What an endpoint demands before its handler runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirement {
    /// Matrix permission checked by [`PermissionGuard`]; `None` means open.
    pub permission: Option<Permission>,
    pub check: Option<ResourceCheck>,
}

impl Requirement {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn permission(action: Action, resource: Resource) -> Self {
        Self {
            permission: Some(Permission::new(action, resource)),
            check: None,
        }
    }

    pub fn with_check(mut self, check: ResourceCheck) -> Self {
        self.check = Some(check);
        self
    }
}

/// Endpoint to requirement map, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct EndpointRequirements {
    routes: HashMap<Endpoint, Requirement>,
}

impl EndpointRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, method: Method, route: &str, requirement: Requirement) -> Self {
        self.routes.insert(Endpoint::new(method, route), requirement);
        self
    }

    /// Requirement for `endpoint`; unregistered endpoints are open.
    pub fn get(&self, endpoint: &Endpoint) -> Requirement {
        self.routes.get(endpoint).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Requirements of the task service's routes.
    pub fn task_service() -> Self {
        use Action::*;
        use ResourceCheck::*;

        let task = |action| Requirement::permission(action, Resource::Task);
        let member = |action| Requirement::permission(action, Resource::Member);

        Self::new()
            .route(Method::POST, "/tasks", task(Create).with_check(TaskWrite))
            .route(Method::GET, "/tasks/:id", task(Read).with_check(TaskRead))
            .route(Method::PATCH, "/tasks/:id", task(Update).with_check(TaskWrite))
            .route(Method::DELETE, "/tasks/:id", task(Delete).with_check(TaskWrite))
            .route(Method::GET, "/departments/:id", Requirement::permission(Read, Resource::Department))
            .route(Method::PATCH, "/departments/:id", Requirement::permission(Update, Resource::Department))
            .route(Method::GET, "/departments/:departmentId/members", member(Read))
            .route(
                Method::POST,
                "/departments/:departmentId/members",
                member(Create).with_check(Membership),
            )
            .route(
                Method::DELETE,
                "/departments/:departmentId/members/:userId",
                member(Delete).with_check(Membership),
            )
            .route(Method::GET, "/audit-logs", Requirement::none())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Guard
// ═══════════════════════════════════════════════════════════════════════════════

/// Checks a declared `(action, resource)` against the resolved department.
#[derive(Clone)]
pub struct PermissionGuard {
    engine: PolicyEngine,
    resolver: ContextResolver,
}

impl PermissionGuard {
    pub fn new(engine: PolicyEngine, resolver: ContextResolver) -> Self {
        Self { engine, resolver }
    }

    pub async fn check(&self, permission: Option<Permission>, ctx: &mut RequestContext) -> Result<()> {
        let Some(permission) = permission else {
            return Ok(());
        };
        let Some(user) = ctx.user.clone() else {
            return Err(GateError::unauthenticated());
        };
        if self.engine.is_owner(&user) {
            debug!(user_id = %user.id, permission = %permission, "Owner bypass");
            return Ok(());
        }

        let Some((department_id, _)) = self
            .resolver
            .resolve_department(ctx, permission.resource)
            .await?
        else {
            warn!(user_id = %user.id, permission = %permission, "No department for request");
            return Err(GateError::context_unresolvable());
        };

        if self.engine.has_permission(&user, department_id, &permission).await? {
            Ok(())
        } else {
            warn!(
                user_id = %user.id,
                department_id = %department_id,
                permission = %permission,
                "Permission denied"
            );
            Err(GateError::missing_permission(permission.action, permission.resource))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorCode;
    use crate::rbac::context::{DEPARTMENT_KEY, RESOURCE_ID_PARAM};
    use crate::rbac::models::{AuthUser, DepartmentId, OrganizationId, Role, RoleAssignment, Task, UserId};
    use crate::rbac::roles::PermissionMatrix;
    use crate::rbac::store::InMemoryDirectory;

    fn guard(directory: &InMemoryDirectory) -> PermissionGuard {
        let engine = PolicyEngine::new(
            Arc::new(directory.clone()),
            Arc::new(PermissionMatrix::defaults()),
        );
        PermissionGuard::new(engine, ContextResolver::new(Arc::new(directory.clone())))
    }

    fn viewer_in(directory: &InMemoryDirectory, dept: DepartmentId) -> AuthUser {
        let user = AuthUser::new(UserId::new(), OrganizationId::new());
        directory.assign(RoleAssignment::new(user.id, dept, Role::Viewer));
        user
    }

    #[tokio::test]
    async fn test_no_requirement_allows_anonymous() {
        let directory = InMemoryDirectory::new();
        let mut ctx = RequestContext::new(None);
        assert!(guard(&directory).check(None, &mut ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_user_is_unauthenticated() {
        let directory = InMemoryDirectory::new();
        let mut ctx = RequestContext::new(None);
        let err = guard(&directory)
            .check(Some(Permission::new(Action::Read, Resource::Task)), &mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthenticated);
    }

    #[tokio::test]
    async fn test_owner_skips_resolution() {
        let directory = InMemoryDirectory::new();
        let owner = AuthUser::owner(UserId::new(), OrganizationId::new());
        let mut ctx = RequestContext::new(Some(owner)).with_param(RESOURCE_ID_PARAM, "whatever");

        guard(&directory)
            .check(Some(Permission::new(Action::Delete, Resource::Task)), &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.resolved_department(), None);
        assert_eq!(directory.task_lookups(), 0);
    }

    #[tokio::test]
    async fn test_unresolvable_context() {
        let directory = InMemoryDirectory::new();
        let user = viewer_in(&directory, DepartmentId::new());
        let mut ctx = RequestContext::new(Some(user));

        let err = guard(&directory)
            .check(Some(Permission::new(Action::Read, Resource::Task)), &mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ContextUnresolvable);
    }

    #[tokio::test]
    async fn test_matrix_denial_names_permission() {
        let directory = InMemoryDirectory::new();
        let dept = DepartmentId::new();
        let user = viewer_in(&directory, dept);
        let mut ctx = RequestContext::new(Some(user)).with_query(DEPARTMENT_KEY, dept.to_string());

        let err = guard(&directory)
            .check(Some(Permission::new(Action::Delete, Resource::Task)), &mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert!(err.user_message().contains("delete task"));
    }

    #[tokio::test]
    async fn test_allowed_through_target_task() {
        let directory = InMemoryDirectory::new();
        let dept = DepartmentId::new();
        let user = viewer_in(&directory, dept);
        let task = Task::new(dept, UserId::new(), "Somebody's");
        directory.add_task(task.clone());
        let mut ctx = RequestContext::new(Some(user)).with_param(RESOURCE_ID_PARAM, task.id.to_string());

        guard(&directory)
            .check(Some(Permission::new(Action::Read, Resource::Task)), &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.cached_task(task.id), Some(&task));
    }

    #[test]
    fn test_registry_defaults_to_open() {
        let registry = EndpointRequirements::task_service();
        let unknown = registry.get(&Endpoint::new(Method::GET, "/health"));
        assert_eq!(unknown, Requirement::none());

        let create = registry.get(&Endpoint::new(Method::POST, "/tasks"));
        assert_eq!(create.permission, Some(Permission::new(Action::Create, Resource::Task)));
        assert_eq!(create.check, Some(ResourceCheck::TaskWrite));

        let read = registry.get(&Endpoint::new(Method::GET, "/tasks/:id"));
        assert_eq!(read.check, Some(ResourceCheck::TaskRead));

        let invite = registry.get(&Endpoint::new(Method::POST, "/departments/:departmentId/members"));
        assert_eq!(invite.check, Some(ResourceCheck::Membership));
    }
}
