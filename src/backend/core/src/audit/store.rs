//! Audit persistence seam and the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::models::{AuditFilters, AuditLogEntry, AuditScope};
use crate::error::Result;
use crate::pagination::OffsetPagination;

/// Create-only audit storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert(&self, entry: &AuditLogEntry) -> Result<()>;

    /// One page of entries, newest first, plus the total match count.
    async fn query(
        &self,
        scope: &AuditScope,
        filters: &AuditFilters,
        pagination: &OffsetPagination,
    ) -> Result<(Vec<AuditLogEntry>, u64)>;
}

/// Append-only in-memory audit log.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditStore {
    entries: Arc<RwLock<Vec<AuditLogEntry>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of every entry in insertion order.
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().clone()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn insert(&self, entry: &AuditLogEntry) -> Result<()> {
        self.entries.write().push(entry.clone());
        Ok(())
    }

    async fn query(
        &self,
        scope: &AuditScope,
        filters: &AuditFilters,
        pagination: &OffsetPagination,
    ) -> Result<(Vec<AuditLogEntry>, u64)> {
        let mut matching: Vec<AuditLogEntry> = self
            .entries
            .read()
            .iter()
            .rev()
            .filter(|entry| scope.admits(entry) && filters.matches(entry))
            .cloned()
            .collect();
        // Stable: later inserts stay first among equal timestamps.
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        Ok((pagination.paginate_slice(&matching), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::models::{AuditAction, NewAuditEntry};
    use crate::rbac::{DepartmentId, OrganizationId, UserId};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn entry_in(org: OrganizationId, dept: DepartmentId, action: AuditAction) -> AuditLogEntry {
        NewAuditEntry::new(action, "tasks")
            .actor(UserId::new(), org)
            .details(json!({ "departmentId": dept.to_string() }))
            .into_entry()
    }

    #[tokio::test]
    async fn test_newest_first() {
        let store = InMemoryAuditStore::new();
        let org = OrganizationId::new();
        let dept = DepartmentId::new();

        let mut older = entry_in(org, dept, AuditAction::Create);
        older.created_at = Utc::now() - Duration::hours(1);
        let newer = entry_in(org, dept, AuditAction::Update);
        store.insert(&newer).await.unwrap();
        store.insert(&older).await.unwrap();

        let (items, total) = store
            .query(&AuditScope::Organization(org), &AuditFilters::default(), &OffsetPagination::default())
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(items[0].id, newer.id);
        assert_eq!(items[1].id, older.id);
    }

    #[tokio::test]
    async fn test_filters_combine_with_scope() {
        let store = InMemoryAuditStore::new();
        let org = OrganizationId::new();
        let (a, b) = (DepartmentId::new(), DepartmentId::new());

        store.insert(&entry_in(org, a, AuditAction::Create)).await.unwrap();
        store.insert(&entry_in(org, a, AuditAction::Delete)).await.unwrap();
        store.insert(&entry_in(org, b, AuditAction::Delete)).await.unwrap();
        store.insert(&entry_in(OrganizationId::new(), a, AuditAction::Delete)).await.unwrap();

        let filters = AuditFilters {
            action: Some(AuditAction::Delete),
            department_id: Some(a),
            ..AuditFilters::default()
        };
        let (items, total) = store
            .query(&AuditScope::Organization(org), &filters, &OffsetPagination::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].department_id, Some(a));

        let (_, across_orgs) = store
            .query(&AuditScope::Departments(vec![a]), &filters, &OffsetPagination::default())
            .await
            .unwrap();
        assert_eq!(across_orgs, 2);
    }
}
