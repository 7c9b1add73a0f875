#![allow(clippy::result_large_err)]
//! # Taskgate Core
//!
//! Multi-tenant authorization and audit trail for the task tracking service.
//!
//! ## Architecture
//!
//! - **RBAC**: Decision engine (owner > department admin > viewer), context
//!   resolution, the permission guard, and the task ownership guard
//! - **Audit**: Best-effort recording of mutations and denials, and
//!   RBAC-scoped, filterable reads
//! - **Middleware**: Tower layers that run the guards and the recorder in a
//!   fixed order around every route
//! - **Database**: PostgreSQL implementations of every store
//! - **Telemetry**: Structured logging and Prometheus metrics
//! - **Pagination**: 1-indexed offset pagination and the page envelope

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod pagination;
pub mod rbac;
pub mod telemetry;

pub use error::{ErrorCode, ErrorDetails, GateError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{build_router, AppState, Stores};
    pub use crate::audit::{
        AuditAction, AuditFilters, AuditLogEntry, AuditQueryService, AuditRecorder, AuditStore,
        InMemoryAuditStore, NewAuditEntry,
    };
    pub use crate::error::{ErrorCode, GateError, Result};
    pub use crate::pagination::{OffsetPagination, Page};
    pub use crate::rbac::{
        Action, AuthUser, Department, DepartmentId, Endpoint, EndpointRequirements, Enforcer,
        InMemoryDirectory, OrganizationId, Permission, PermissionMatrix, PolicyEngine,
        RequestContext, ResolvedContext, Resource, Role, RoleAssignment, Task, TaskId, UserId,
    };
}
