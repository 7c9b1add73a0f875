//! Audit log entries and the filters used to read them back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::rbac::{DepartmentId, OrganizationId, UserId, DEPARTMENT_KEY};

// ═══════════════════════════════════════════════════════════════════════════════
// Action
// ═══════════════════════════════════════════════════════════════════════════════

/// What an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    /// A denied attempt; the intended action is kept in `details`.
    AccessDenied,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::AccessDenied => "access_denied",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "access_denied" => Ok(Self::AccessDenied),
            other => Err(format!("unknown audit action: {}", other)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entries
// ═══════════════════════════════════════════════════════════════════════════════

/// An immutable audit record.
///
/// `department_id` and `organization_id` are attribution columns captured at
/// write time; they drive RBAC scoping and are not part of the API shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub resource: String,
    pub resource_id: Option<String>,
    pub user_id: UserId,
    pub ip_address: Option<String>,
    pub details: Value,
    #[serde(skip)]
    pub department_id: Option<DepartmentId>,
    #[serde(skip)]
    pub organization_id: Option<OrganizationId>,
    pub created_at: DateTime<Utc>,
}

/// Input to the recorder: everything but the server-assigned fields.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub resource: String,
    pub resource_id: Option<String>,
    /// `None` for unauthenticated actors.
    pub user_id: Option<UserId>,
    pub organization_id: Option<OrganizationId>,
    pub ip_address: Option<String>,
    pub details: Value,
}

impl NewAuditEntry {
    pub fn new(action: AuditAction, resource: impl Into<String>) -> Self {
        Self {
            action,
            resource: resource.into(),
            resource_id: None,
            user_id: None,
            organization_id: None,
            ip_address: None,
            details: Value::Object(Default::default()),
        }
    }

    pub fn resource_id(mut self, resource_id: Option<String>) -> Self {
        self.resource_id = resource_id;
        self
    }

    pub fn actor(mut self, user_id: UserId, organization_id: OrganizationId) -> Self {
        self.user_id = Some(user_id);
        self.organization_id = Some(organization_id);
        self
    }

    pub fn ip_address(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Stamp id and timestamp, falling back to the anonymous actor.
    pub fn into_entry(self) -> AuditLogEntry {
        let department_id = self
            .details
            .get(DEPARTMENT_KEY)
            .and_then(Value::as_str)
            .and_then(|raw| DepartmentId::from_str(raw).ok());

        AuditLogEntry {
            id: Uuid::new_v4(),
            action: self.action,
            resource: self.resource,
            resource_id: self.resource_id,
            user_id: self.user_id.unwrap_or(UserId::ANONYMOUS),
            ip_address: self.ip_address,
            details: self.details,
            department_id,
            organization_id: self.organization_id,
            created_at: Utc::now(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scope and filters
// ═══════════════════════════════════════════════════════════════════════════════

/// Base RBAC scope of an audit read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditScope {
    /// Everything attributed to the owner's organization.
    Organization(OrganizationId),
    /// Entries attributed to any of these departments.
    Departments(Vec<DepartmentId>),
}

impl AuditScope {
    pub fn admits(&self, entry: &AuditLogEntry) -> bool {
        match self {
            Self::Organization(org) => entry.organization_id == Some(*org),
            Self::Departments(departments) => entry
                .department_id
                .map_or(false, |dept| departments.contains(&dept)),
        }
    }
}

/// Optional filters, AND-combined on top of the scope. Bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilters {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub user_id: Option<UserId>,
    pub action: Option<AuditAction>,
    pub resource: Option<String>,
    pub department_id: Option<DepartmentId>,
}

impl AuditFilters {
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.date_from.map_or(true, |from| entry.created_at >= from)
            && self.date_to.map_or(true, |to| entry.created_at <= to)
            && self.user_id.map_or(true, |user| entry.user_id == user)
            && self.action.map_or(true, |action| entry.action == action)
            && self
                .resource
                .as_deref()
                .map_or(true, |resource| entry.resource == resource)
            && self
                .department_id
                .map_or(true, |dept| entry.department_id == Some(dept))
    }
}
