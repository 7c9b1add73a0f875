//! PostgreSQL role, permission, and resource stores.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{GateError, Result};
use crate::rbac::{
    Department, DepartmentId, Permission, PermissionStore, ResourceStore, Role, RoleAssignment,
    RoleStore, Task, TaskId, UserId,
};

fn parse_role(raw: &str) -> Result<Role> {
    Role::parse(raw).ok_or_else(|| GateError::internal(format!("Unknown role in user_roles: {}", raw)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Roles
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct PgRoleStore {
    pool: PgPool,
}

impl PgRoleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn find_role(&self, user_id: UserId, department_id: DepartmentId) -> Result<Option<Role>> {
        let role: Option<String> = sqlx::query_scalar(
            r#"
            SELECT role FROM user_roles
            WHERE user_id = $1 AND department_id = $2
            "#,
        )
        .bind(user_id)
        .bind(department_id)
        .fetch_optional(&self.pool)
        .await?;

        role.as_deref().map(parse_role).transpose()
    }

    async fn departments_for_user(&self, user_id: UserId, role: Option<Role>) -> Result<Vec<Department>> {
        let departments = sqlx::query_as::<_, Department>(
            r#"
            SELECT d.id, d.organization_id, d.name
            FROM departments d
            JOIN user_roles ur ON ur.department_id = d.id
            WHERE ur.user_id = $1 AND ($2::text IS NULL OR ur.role = $2)
            ORDER BY d.name
            "#,
        )
        .bind(user_id)
        .bind(role.map(|role| role.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(departments)
    }

    async fn assignments_for_user(&self, user_id: UserId) -> Result<Vec<RoleAssignment>> {
        let rows: Vec<(Option<Uuid>, String)> = sqlx::query_as(
            r#"
            SELECT department_id, role FROM user_roles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(department_id, role)| {
                Ok(RoleAssignment {
                    user_id,
                    department_id: department_id.map(DepartmentId),
                    role: parse_role(&role)?,
                })
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permissions
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct PgPermissionStore {
    pool: PgPool,
}

impl PgPermissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionStore for PgPermissionStore {
    async fn is_granted(&self, permission: &Permission, role: Role) -> Result<bool> {
        let granted: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM permissions
                WHERE action = $1 AND resource = $2 AND role = $3
            )
            "#,
        )
        .bind(permission.action.as_str())
        .bind(permission.resource.as_str())
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(granted)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resources
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct PgResourceStore {
    pool: PgPool,
}

impl PgResourceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceStore for PgResourceStore {
    async fn find_task(&self, task_id: TaskId, with_deleted: bool) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, department_id, title, created_by_id, assigned_to_id, deleted_at
            FROM tasks
            WHERE id = $1 AND ($2 OR deleted_at IS NULL)
            "#,
        )
        .bind(task_id)
        .bind(with_deleted)
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    async fn find_department(&self, department_id: DepartmentId) -> Result<Option<Department>> {
        let department = sqlx::query_as::<_, Department>(
            r#"
            SELECT id, organization_id, name FROM departments
            WHERE id = $1
            "#,
        )
        .bind(department_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(department)
    }
}
