//! Role-based access control for the task service.
//!
//! This module provides:
//! - **Models**: identifiers, roles, permissions, tasks, departments
//! - **Permission Matrix**: the fixed `(action, resource, role)` allow-list
//! - **Policy Engine**: owner > department admin > department viewer decisions
//! - **Context Resolution**: which department a request concerns
//! - **Guards**: the generic permission guard, then a row-level check (task
//!   ownership for reads and writes, or member management)
//! - **Enforcer**: the guards in a fixed order over one request context
//!
//! # Usage
//!
//! ```rust,ignore
//! use taskgate_core::rbac::{
//!     Endpoint, EndpointRequirements, Enforcer, InMemoryDirectory,
//!     PermissionMatrix, PolicyEngine, RequestContext,
//! };
//!
//! let directory = Arc::new(InMemoryDirectory::new());
//! let engine = PolicyEngine::new(directory.clone(), Arc::new(PermissionMatrix::defaults()));
//! let enforcer = Enforcer::new(engine, directory, EndpointRequirements::task_service());
//!
//! let mut ctx = RequestContext::new(Some(user)).with_param("id", task_id);
//! enforcer.enforce(&Endpoint::new(Method::PATCH, "/tasks/:id"), &mut ctx).await?;
//! ```

pub mod context;
pub mod enforcer;
pub mod guard;
pub mod membership;
pub mod models;
pub mod ownership;
pub mod policy;
pub mod roles;
pub mod store;

pub use context::{
    ContextResolver, DepartmentSource, LoadedResource, RequestContext, ResolvedContext,
    DEPARTMENT_KEY, RESOURCE_ID_PARAM,
};
pub use enforcer::Enforcer;
pub use guard::{Endpoint, EndpointRequirements, PermissionGuard, Requirement, ResourceCheck};
pub use membership::{MembershipGuard, MEMBER_PARAM, ROLE_KEY};
pub use models::{
    Action, AuthUser, Department, DepartmentId, OrganizationId, Permission, Resource, Role,
    RoleAssignment, Task, TaskId, UserId,
};
pub use ownership::TaskOwnershipGuard;
pub use policy::{PolicyDecision, PolicyEngine};
pub use roles::{PermissionEntry, PermissionMatrix};
pub use store::{InMemoryDirectory, PermissionStore, ResourceStore, RoleStore};
