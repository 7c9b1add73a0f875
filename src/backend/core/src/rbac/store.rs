//! Storage seams consulted by the decision engine and the guards.
//!
//! Production wiring uses the PostgreSQL implementations in [`crate::db`];
//! [`InMemoryDirectory`] backs tests and local development.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::models::{Department, DepartmentId, Permission, Role, RoleAssignment, Task, TaskId, UserId};
use crate::error::Result;

/// Reads `(user, department) -> role` assignments.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Point lookup keyed by `(user_id, department_id)`.
    async fn find_role(&self, user_id: UserId, department_id: DepartmentId) -> Result<Option<Role>>;

    /// Departments the user holds an assignment in, optionally restricted to
    /// one role. Organization-wide rows without a department are never listed.
    async fn departments_for_user(&self, user_id: UserId, role: Option<Role>) -> Result<Vec<Department>>;

    /// Every assignment the user holds, for preloading onto an `AuthUser`.
    async fn assignments_for_user(&self, user_id: UserId) -> Result<Vec<RoleAssignment>>;
}

/// Answers whether the permission matrix contains a row.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn is_granted(&self, permission: &Permission, role: Role) -> Result<bool>;
}

/// Point lookups for the resources a request can target.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Load a task; soft-deleted tasks are returned only when `with_deleted`.
    async fn find_task(&self, task_id: TaskId, with_deleted: bool) -> Result<Option<Task>>;

    async fn find_department(&self, department_id: DepartmentId) -> Result<Option<Department>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory directory
// ═══════════════════════════════════════════════════════════════════════════════

/// Thread-safe in-memory implementation of [`RoleStore`] and [`ResourceStore`].
///
/// Counts point lookups so callers can assert that cached resources are reused.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    assignments: Arc<DashMap<(UserId, Option<DepartmentId>), Role>>,
    departments: Arc<DashMap<DepartmentId, Department>>,
    tasks: Arc<DashMap<TaskId, Task>>,
    role_lookups: Arc<AtomicUsize>,
    task_lookups: Arc<AtomicUsize>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_department(&self, department: Department) {
        self.departments.insert(department.id, department);
    }

    pub fn add_task(&self, task: Task) {
        self.tasks.insert(task.id, task);
    }

    /// Record an assignment, replacing any existing role for the same department.
    pub fn assign(&self, assignment: RoleAssignment) {
        self.assignments
            .insert((assignment.user_id, assignment.department_id), assignment.role);
    }

    pub fn revoke(&self, user_id: UserId, department_id: DepartmentId) -> bool {
        self.assignments.remove(&(user_id, Some(department_id))).is_some()
    }

    /// All assignments held by a user, e.g. to preload them onto an [`AuthUser`].
    ///
    /// [`AuthUser`]: super::models::AuthUser
    pub fn assignments_for(&self, user_id: UserId) -> Vec<RoleAssignment> {
        self.assignments
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| RoleAssignment {
                user_id,
                department_id: entry.key().1,
                role: *entry.value(),
            })
            .collect()
    }

    pub fn role_lookups(&self) -> usize {
        self.role_lookups.load(Ordering::SeqCst)
    }

    pub fn task_lookups(&self) -> usize {
        self.task_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoleStore for InMemoryDirectory {
    async fn find_role(&self, user_id: UserId, department_id: DepartmentId) -> Result<Option<Role>> {
        self.role_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .assignments
            .get(&(user_id, Some(department_id)))
            .map(|role| *role))
    }

    async fn departments_for_user(&self, user_id: UserId, role: Option<Role>) -> Result<Vec<Department>> {
        let mut departments: Vec<Department> = self
            .assignments
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .filter(|entry| role.map_or(true, |wanted| *entry.value() == wanted))
            .filter_map(|entry| entry.key().1)
            .filter_map(|department_id| self.departments.get(&department_id).map(|d| d.clone()))
            .collect();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    async fn assignments_for_user(&self, user_id: UserId) -> Result<Vec<RoleAssignment>> {
        Ok(self.assignments_for(user_id))
    }
}

#[async_trait]
impl ResourceStore for InMemoryDirectory {
    async fn find_task(&self, task_id: TaskId, with_deleted: bool) -> Result<Option<Task>> {
        self.task_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tasks
            .get(&task_id)
            .map(|task| task.clone())
            .filter(|task| with_deleted || !task.is_deleted()))
    }

    async fn find_department(&self, department_id: DepartmentId) -> Result<Option<Department>> {
        Ok(self.departments.get(&department_id).map(|d| d.clone()))
    }
}
