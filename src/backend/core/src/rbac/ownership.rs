//! Task ownership guard for task reads and writes.
//!
//! Runs after [`PermissionGuard`](super::guard::PermissionGuard) on the same
//! [`RequestContext`], reusing any task it already loaded.

use std::str::FromStr;
use std::sync::Arc;

use tracing::warn;

use super::context::{LoadedResource, RequestContext};
use super::models::{Task, TaskId};
use super::policy::PolicyEngine;
use super::store::ResourceStore;
use crate::error::{GateError, Result};

#[derive(Clone)]
pub struct TaskOwnershipGuard {
    engine: PolicyEngine,
    resources: Arc<dyn ResourceStore>,
}

impl TaskOwnershipGuard {
    pub fn new(engine: PolicyEngine, resources: Arc<dyn ResourceStore>) -> Self {
        Self { engine, resources }
    }

    /// Create branch when the path names no task, modify branch otherwise.
    pub async fn check(&self, ctx: &mut RequestContext) -> Result<()> {
        let Some(user) = ctx.user.clone() else {
            return Err(GateError::unauthenticated());
        };
        if self.engine.is_owner(&user) {
            return Ok(());
        }

        match ctx.target_id().map(str::to_owned) {
            None => {
                let Some(department_id) = ctx.body_department()? else {
                    return Err(GateError::permission_denied(
                        "A department is required to create a task",
                    ));
                };
                if !self
                    .engine
                    .can_create_task_in_department(&user, department_id)
                    .await?
                {
                    warn!(user_id = %user.id, department_id = %department_id, "Task creation denied");
                    return Err(GateError::permission_denied(
                        "You do not have permission to create tasks in this department",
                    ));
                }
                Ok(())
            }
            Some(raw_id) => {
                let task = self.target_task(ctx, &raw_id).await?;
                if !self.engine.can_modify_task(&user, &task).await? {
                    warn!(user_id = %user.id, task_id = %task.id, "Task modification denied");
                    return Err(GateError::permission_denied(
                        "You do not have permission to modify this task",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Read branch: a targeted task must pass `can_access_task`. Requests
    /// that name no task are left to the handler's own scoping.
    pub async fn check_read(&self, ctx: &mut RequestContext) -> Result<()> {
        let Some(user) = ctx.user.clone() else {
            return Err(GateError::unauthenticated());
        };
        if self.engine.is_owner(&user) {
            return Ok(());
        }
        let Some(raw_id) = ctx.target_id().map(str::to_owned) else {
            return Ok(());
        };

        let task = self.target_task(ctx, &raw_id).await?;
        if !self.engine.can_access_task(&user, &task).await? {
            warn!(user_id = %user.id, task_id = %task.id, "Task read denied");
            return Err(GateError::permission_denied(
                "You do not have permission to view this task",
            ));
        }
        Ok(())
    }

    /// The cached task when present, otherwise a lookup that is then cached.
    /// Missing tasks are reported as not found, never as a denial.
    async fn target_task(&self, ctx: &mut RequestContext, raw_id: &str) -> Result<Task> {
        let task_id =
            TaskId::from_str(raw_id).map_err(|_| GateError::not_found("Task", raw_id))?;

        if let Some(task) = ctx.cached_task(task_id) {
            return Ok(task.clone());
        }

        let task = self
            .resources
            .find_task(task_id, true)
            .await?
            .ok_or_else(|| GateError::not_found("Task", task_id.to_string()))?;
        ctx.cache_resource(LoadedResource::Task(task.clone()));
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::rbac::context::RESOURCE_ID_PARAM;
    use crate::rbac::models::{AuthUser, DepartmentId, OrganizationId, Role, RoleAssignment, UserId};
    use crate::rbac::roles::PermissionMatrix;
    use crate::rbac::store::{InMemoryDirectory, MockResourceStore};
    use serde_json::json;

    fn engine(directory: &InMemoryDirectory) -> PolicyEngine {
        PolicyEngine::new(Arc::new(directory.clone()), Arc::new(PermissionMatrix::defaults()))
    }

    fn guard(directory: &InMemoryDirectory) -> TaskOwnershipGuard {
        TaskOwnershipGuard::new(engine(directory), Arc::new(directory.clone()))
    }

    fn member(directory: &InMemoryDirectory, dept: DepartmentId, role: Role) -> AuthUser {
        let user = AuthUser::new(UserId::new(), OrganizationId::new());
        directory.assign(RoleAssignment::new(user.id, dept, role));
        user
    }

    #[tokio::test]
    async fn test_create_requires_department() {
        let directory = InMemoryDirectory::new();
        let admin = member(&directory, DepartmentId::new(), Role::Admin);
        let mut ctx = RequestContext::new(Some(admin)).with_body(json!({ "title": "x" }));

        let err = guard(&directory).check(&mut ctx).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert!(err.user_message().contains("department is required"));
    }

    #[tokio::test]
    async fn test_create_requires_admin() {
        let directory = InMemoryDirectory::new();
        let dept = DepartmentId::new();
        let admin = member(&directory, dept, Role::Admin);
        let viewer = member(&directory, dept, Role::Viewer);
        let body = json!({ "departmentId": dept.to_string(), "title": "New" });

        let mut ok = RequestContext::new(Some(admin)).with_body(body.clone());
        guard(&directory).check(&mut ok).await.unwrap();

        let mut denied = RequestContext::new(Some(viewer)).with_body(body);
        let err = guard(&directory).check(&mut denied).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_missing_task_is_not_found() {
        let directory = InMemoryDirectory::new();
        let viewer = member(&directory, DepartmentId::new(), Role::Viewer);
        let mut ctx = RequestContext::new(Some(viewer)).with_param(RESOURCE_ID_PARAM, TaskId::new().to_string());

        let err = guard(&directory).check(&mut ctx).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResourceNotFound);
    }

    #[tokio::test]
    async fn test_viewer_modifies_only_own_tasks() {
        let directory = InMemoryDirectory::new();
        let dept = DepartmentId::new();
        let viewer = member(&directory, dept, Role::Viewer);
        let mine = Task::new(dept, viewer.id, "Mine");
        let theirs = Task::new(dept, UserId::new(), "Theirs");
        directory.add_task(mine.clone());
        directory.add_task(theirs.clone());

        let mut ok = RequestContext::new(Some(viewer.clone())).with_param(RESOURCE_ID_PARAM, mine.id.to_string());
        guard(&directory).check(&mut ok).await.unwrap();
        assert_eq!(ok.cached_task(mine.id), Some(&mine));

        let mut denied = RequestContext::new(Some(viewer)).with_param(RESOURCE_ID_PARAM, theirs.id.to_string());
        let err = guard(&directory).check(&mut denied).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_viewer_reads_only_own_or_assigned_tasks() {
        let directory = InMemoryDirectory::new();
        let dept = DepartmentId::new();
        let viewer = member(&directory, dept, Role::Viewer);
        let assigned = Task::new(dept, UserId::new(), "Assigned").assigned_to(viewer.id);
        let theirs = Task::new(dept, UserId::new(), "Theirs");
        directory.add_task(assigned.clone());
        directory.add_task(theirs.clone());

        let mut ok = RequestContext::new(Some(viewer.clone())).with_param(RESOURCE_ID_PARAM, assigned.id.to_string());
        guard(&directory).check_read(&mut ok).await.unwrap();

        let mut denied = RequestContext::new(Some(viewer)).with_param(RESOURCE_ID_PARAM, theirs.id.to_string());
        let err = guard(&directory).check_read(&mut denied).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert!(err.user_message().contains("view this task"));
    }

    #[tokio::test]
    async fn test_read_checks_the_task_department_not_the_claimed_one() {
        let directory = InMemoryDirectory::new();
        let (mine, other) = (DepartmentId::new(), DepartmentId::new());
        let admin = member(&directory, mine, Role::Admin);
        let task = Task::new(other, UserId::new(), "Elsewhere");
        directory.add_task(task.clone());

        let mut ctx = RequestContext::new(Some(admin))
            .with_param(RESOURCE_ID_PARAM, task.id.to_string())
            .with_query(crate::rbac::context::DEPARTMENT_KEY, mine.to_string());
        let err = guard(&directory).check_read(&mut ctx).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_cached_task_is_reused() {
        let dept = DepartmentId::new();
        let directory = InMemoryDirectory::new();
        let admin = member(&directory, dept, Role::Admin);
        let task = Task::new(dept, UserId::new(), "Cached");

        let mut resources = MockResourceStore::new();
        resources.expect_find_task().never();
        let guard = TaskOwnershipGuard::new(engine(&directory), Arc::new(resources));

        let mut ctx = RequestContext::new(Some(admin)).with_param(RESOURCE_ID_PARAM, task.id.to_string());
        ctx.cache_resource(LoadedResource::Task(task));
        guard.check(&mut ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_owner_short_circuits_both_branches() {
        let mut resources = MockResourceStore::new();
        resources.expect_find_task().never();
        let directory = InMemoryDirectory::new();
        let guard = TaskOwnershipGuard::new(engine(&directory), Arc::new(resources));
        let owner = AuthUser::owner(UserId::new(), OrganizationId::new());

        let mut create = RequestContext::new(Some(owner.clone()));
        guard.check(&mut create).await.unwrap();

        let mut modify = RequestContext::new(Some(owner)).with_param(RESOURCE_ID_PARAM, TaskId::new().to_string());
        guard.check(&mut modify).await.unwrap();
    }
}
