//! RBAC data models: identifiers, roles, permissions, and the entities the
//! decision engine reasons about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Strongly-typed user identifier.
    UserId
);
uuid_id!(
    /// Strongly-typed organization (tenant) identifier.
    OrganizationId
);
uuid_id!(
    /// Strongly-typed department identifier.
    DepartmentId
);
uuid_id!(
    /// Strongly-typed task identifier.
    TaskId
);

impl UserId {
    /// Stand-in actor for audit entries written without an authenticated user.
    pub const ANONYMOUS: UserId = UserId(Uuid::nil());

    pub fn is_anonymous(&self) -> bool {
        self.0.is_nil()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// Department-scoped role. Organization ownership is a user flag, not a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Viewer => "VIEWER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Self::Admin),
            "VIEWER" => Some(Self::Viewer),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assignment of a user to a role within one department.
///
/// `department_id` is `None` only for the owner's organization-wide standing;
/// ADMIN and VIEWER assignments always carry a department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub user_id: UserId,
    pub department_id: Option<DepartmentId>,
    pub role: Role,
}

impl RoleAssignment {
    pub fn new(user_id: UserId, department_id: DepartmentId, role: Role) -> Self {
        Self {
            user_id,
            department_id: Some(department_id),
            role,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// Verb half of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "read" => Some(Self::Read),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource half of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Task,
    Department,
    Member,
    AuditLog,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Department => "department",
            Self::Member => "member",
            Self::AuditLog => "audit_log",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task" => Some(Self::Task),
            "department" => Some(Self::Department),
            "member" => Some(Self::Member),
            "audit_log" => Some(Self::AuditLog),
            _ => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action on a resource type, e.g. `task:update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub action: Action,
    pub resource: Resource,
}

impl Permission {
    pub const fn new(action: Action, resource: Resource) -> Self {
        Self { action, resource }
    }

    /// Parse `"resource:action"`.
    pub fn parse(s: &str) -> Option<Self> {
        let (resource, action) = s.split_once(':')?;
        Some(Self::new(Action::parse(action)?, Resource::parse(resource)?))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Principals and entities
// ═══════════════════════════════════════════════════════════════════════════════

/// The authenticated caller, as attached to the request by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: UserId,
    pub organization_id: OrganizationId,
    pub is_owner: bool,
    /// Role assignments loaded together with the user, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<RoleAssignment>>,
}

impl AuthUser {
    pub fn new(id: UserId, organization_id: OrganizationId) -> Self {
        Self {
            id,
            organization_id,
            is_owner: false,
            roles: None,
        }
    }

    pub fn owner(id: UserId, organization_id: OrganizationId) -> Self {
        Self {
            is_owner: true,
            ..Self::new(id, organization_id)
        }
    }

    pub fn with_roles(mut self, roles: Vec<RoleAssignment>) -> Self {
        self.roles = Some(roles);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: DepartmentId,
    pub organization_id: OrganizationId,
    pub name: String,
}

impl Department {
    pub fn new(organization_id: OrganizationId, name: impl Into<String>) -> Self {
        Self {
            id: DepartmentId::new(),
            organization_id,
            name: name.into(),
        }
    }
}

/// A task. Tasks are soft-deleted; `deleted_at` marks removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub department_id: DepartmentId,
    pub title: String,
    pub created_by_id: UserId,
    pub assigned_to_id: Option<UserId>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(department_id: DepartmentId, created_by_id: UserId, title: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            department_id,
            title: title.into(),
            created_by_id,
            assigned_to_id: None,
            deleted_at: None,
        }
    }

    pub fn assigned_to(mut self, user_id: UserId) -> Self {
        self.assigned_to_id = Some(user_id);
        self
    }

    /// Created by or assigned to `user_id`.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.created_by_id == user_id || self.assigned_to_id == Some(user_id)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
