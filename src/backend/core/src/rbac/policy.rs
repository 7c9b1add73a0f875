//! Decision engine for authorization checks.
//!
//! The engine answers questions of the form "may this user do X here?".
//! Precedence is fixed: the organization owner is allowed everything, a
//! department ADMIN is allowed everything in that department, and a VIEWER
//! is limited to tasks they created or were assigned.
//!
//! Predicates never fail on a denial. `Ok(false)` means "no"; `Err` is only
//! returned when a backing store could not be read.

use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use super::models::{AuthUser, Department, DepartmentId, Permission, Role, Task, UserId};
use super::store::{PermissionStore, RoleStore};
use crate::error::Result;

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a policy evaluation, kept for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny(String),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policy Engine
// ═══════════════════════════════════════════════════════════════════════════════

/// Owner > department admin > department viewer.
#[derive(Clone)]
pub struct PolicyEngine {
    roles: Arc<dyn RoleStore>,
    permissions: Arc<dyn PermissionStore>,
}

impl PolicyEngine {
    pub fn new(roles: Arc<dyn RoleStore>, permissions: Arc<dyn PermissionStore>) -> Self {
        Self { roles, permissions }
    }

    pub fn is_owner(&self, user: &AuthUser) -> bool {
        user.is_owner
    }

    /// Role held by `user` in `department_id`.
    ///
    /// Uses the assignments preloaded on the user when present and only falls
    /// back to a store lookup when nothing was preloaded.
    pub async fn role_in_department(
        &self,
        user: &AuthUser,
        department_id: DepartmentId,
    ) -> Result<Option<Role>> {
        if let Some(assignments) = &user.roles {
            return Ok(assignments
                .iter()
                .find(|a| a.department_id == Some(department_id))
                .map(|a| a.role));
        }
        self.roles.find_role(user.id, department_id).await
    }

    /// Stored role of any user in `department_id`, e.g. a member about to
    /// be removed.
    pub async fn role_of(&self, user_id: UserId, department_id: DepartmentId) -> Result<Option<Role>> {
        self.roles.find_role(user_id, department_id).await
    }

    /// Read access to a single task.
    pub async fn can_access_task(&self, user: &AuthUser, task: &Task) -> Result<bool> {
        self.task_gate(user, task).await
    }

    /// Write access to a single task. Deliberately the same gate as reads.
    pub async fn can_modify_task(&self, user: &AuthUser, task: &Task) -> Result<bool> {
        self.task_gate(user, task).await
    }

    async fn task_gate(&self, user: &AuthUser, task: &Task) -> Result<bool> {
        if self.is_owner(user) {
            return Ok(true);
        }
        let decision = match self.role_in_department(user, task.department_id).await? {
            None => PolicyDecision::Deny("no role in task department".into()),
            Some(Role::Admin) => PolicyDecision::Allow,
            Some(Role::Viewer) if task.is_owned_by(user.id) => PolicyDecision::Allow,
            Some(Role::Viewer) => PolicyDecision::Deny("viewer does not own task".into()),
        };
        Ok(self.observe("task", user.id, decision))
    }

    pub async fn can_create_task_in_department(
        &self,
        user: &AuthUser,
        department_id: DepartmentId,
    ) -> Result<bool> {
        if self.is_owner(user) {
            return Ok(true);
        }
        let role = self.role_in_department(user, department_id).await?;
        let decision = if role == Some(Role::Admin) {
            PolicyDecision::Allow
        } else {
            PolicyDecision::Deny("task creation requires ADMIN".into())
        };
        Ok(self.observe("task_create", user.id, decision))
    }

    /// Whether `user` may add or remove members holding `target_role`.
    ///
    /// Only the owner may grant ADMIN; department admins manage viewers.
    pub async fn can_manage_department_members(
        &self,
        user: &AuthUser,
        department_id: DepartmentId,
        target_role: Role,
    ) -> Result<bool> {
        if self.is_owner(user) {
            return Ok(true);
        }
        let decision = match target_role {
            Role::Admin => PolicyDecision::Deny("only the owner may grant ADMIN".into()),
            Role::Viewer => match self.role_in_department(user, department_id).await? {
                Some(Role::Admin) => PolicyDecision::Allow,
                _ => PolicyDecision::Deny("member management requires ADMIN".into()),
            },
        };
        Ok(self.observe("members", user.id, decision))
    }

    /// Matrix check for a declared `(action, resource)` in one department.
    pub async fn has_permission(
        &self,
        user: &AuthUser,
        department_id: DepartmentId,
        permission: &Permission,
    ) -> Result<bool> {
        if self.is_owner(user) {
            return Ok(true);
        }
        let decision = match self.role_in_department(user, department_id).await? {
            None => PolicyDecision::Deny(format!("no role in department {}", department_id)),
            Some(role) => {
                if self.permissions.is_granted(permission, role).await? {
                    PolicyDecision::Allow
                } else {
                    PolicyDecision::Deny(format!("{} lacks {}", role, permission))
                }
            }
        };
        Ok(self.observe("matrix", user.id, decision))
    }

    /// Every department the user holds any role in.
    pub async fn departments_for_user(&self, user_id: UserId) -> Result<Vec<Department>> {
        self.roles.departments_for_user(user_id, None).await
    }

    /// Departments in which the user is ADMIN.
    pub async fn admin_departments_for_user(&self, user_id: UserId) -> Result<Vec<Department>> {
        self.roles.departments_for_user(user_id, Some(Role::Admin)).await
    }

    fn observe(&self, check: &'static str, user_id: UserId, decision: PolicyDecision) -> bool {
        let outcome = if decision.is_allowed() { "allow" } else { "deny" };
        counter!("taskgate_authz_decisions_total", "check" => check, "outcome" => outcome)
            .increment(1);
        if let PolicyDecision::Deny(reason) = &decision {
            debug!(user_id = %user_id, check, reason = %reason, "Policy denied");
        }
        decision.is_allowed()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
