//! The fixed permission matrix.
//!
//! | Role   | task                       | department    | member                     | audit_log |
//! |--------|----------------------------|---------------|----------------------------|-----------|
//! | ADMIN  | create, read, update, delete | read, update | create, read, update, delete | read    |
//! | VIEWER | read, update               | read          | read                       |           |
//!
//! Viewer access to individual tasks is narrowed further by the ownership
//! guard; the matrix only says which verbs a role may attempt at all.

use std::collections::HashSet;

use async_trait::async_trait;

use super::models::{Action, Permission, Resource, Role};
use super::store::PermissionStore;
use crate::error::Result;

/// One allow-list row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PermissionEntry {
    pub permission: Permission,
    pub role: Role,
}

impl PermissionEntry {
    pub const fn new(action: Action, resource: Resource, role: Role) -> Self {
        Self {
            permission: Permission::new(action, resource),
            role,
        }
    }
}

/// Static allow-list of `(action, resource, role)` rows. A missing row is a denial.
#[derive(Debug, Clone, Default)]
pub struct PermissionMatrix {
    entries: HashSet<PermissionEntry>,
}

impl PermissionMatrix {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The matrix the service ships with.
    pub fn defaults() -> Self {
        use Action::*;
        use Resource::*;

        let mut matrix = Self::empty();
        for action in [Create, Read, Update, Delete] {
            matrix.allow(action, Task, Role::Admin);
            matrix.allow(action, Member, Role::Admin);
        }
        matrix.allow(Read, Department, Role::Admin);
        matrix.allow(Update, Department, Role::Admin);
        matrix.allow(Read, AuditLog, Role::Admin);

        matrix.allow(Read, Task, Role::Viewer);
        matrix.allow(Update, Task, Role::Viewer);
        matrix.allow(Read, Department, Role::Viewer);
        matrix.allow(Read, Member, Role::Viewer);
        matrix
    }

    pub fn allow(&mut self, action: Action, resource: Resource, role: Role) {
        self.entries.insert(PermissionEntry::new(action, resource, role));
    }

    pub fn allows(&self, permission: &Permission, role: Role) -> bool {
        self.entries.contains(&PermissionEntry {
            permission: *permission,
            role,
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = &PermissionEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PermissionStore for PermissionMatrix {
    async fn is_granted(&self, permission: &Permission, role: Role) -> Result<bool> {
        Ok(self.allows(permission, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_rows() {
        let matrix = PermissionMatrix::defaults();
        assert!(matrix.allows(&Permission::new(Action::Delete, Resource::Task), Role::Admin));
        assert!(matrix.allows(&Permission::new(Action::Create, Resource::Member), Role::Admin));
        assert!(matrix.allows(&Permission::new(Action::Read, Resource::AuditLog), Role::Admin));
        assert!(!matrix.allows(&Permission::new(Action::Delete, Resource::Department), Role::Admin));
    }

    #[test]
    fn test_viewer_rows() {
        let matrix = PermissionMatrix::defaults();
        assert!(matrix.allows(&Permission::new(Action::Read, Resource::Task), Role::Viewer));
        assert!(matrix.allows(&Permission::new(Action::Update, Resource::Task), Role::Viewer));
        assert!(!matrix.allows(&Permission::new(Action::Create, Resource::Task), Role::Viewer));
        assert!(!matrix.allows(&Permission::new(Action::Delete, Resource::Task), Role::Viewer));
        assert!(!matrix.allows(&Permission::new(Action::Create, Resource::Member), Role::Viewer));
        assert!(!matrix.allows(&Permission::new(Action::Read, Resource::AuditLog), Role::Viewer));
    }

    #[test]
    fn test_empty_matrix_denies() {
        let matrix = PermissionMatrix::empty();
        assert!(matrix.is_empty());
        assert!(!matrix.allows(&Permission::new(Action::Read, Resource::Task), Role::Admin));
    }
}
