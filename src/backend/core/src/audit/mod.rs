//! Audit trail: best-effort recording of mutations and denials, and
//! RBAC-scoped reads.
//!
//! # Usage
//!
//! ```rust,ignore
//! use taskgate_core::audit::{AuditAction, AuditRecorder, InMemoryAuditStore, NewAuditEntry};
//!
//! let recorder = AuditRecorder::new(Arc::new(InMemoryAuditStore::new()));
//! recorder.spawn(NewAuditEntry::new(AuditAction::Delete, "tasks").actor(user.id, user.organization_id));
//! ```

pub mod models;
pub mod policy;
pub mod query;
pub mod recorder;
pub mod store;

pub use models::{AuditAction, AuditFilters, AuditLogEntry, AuditScope, NewAuditEntry};
pub use policy::{
    action_for_method, is_sensitive_field, resource_from_route, sanitize_body, AuditPolicy,
    RequestFacts,
};
pub use query::AuditQueryService;
pub use recorder::AuditRecorder;
pub use store::{AuditStore, InMemoryAuditStore};
