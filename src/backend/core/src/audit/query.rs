//! RBAC-scoped audit log reads.
//!
//! Scoping is applied here rather than by the request guards: owners read
//! their whole organization, department admins read the union of their
//! admin departments, everyone else is refused.

use std::sync::Arc;

use tracing::{debug, warn};

use super::models::{AuditFilters, AuditLogEntry, AuditScope};
use super::store::AuditStore;
use crate::error::{GateError, Result};
use crate::pagination::{OffsetPaginationBuilder, Page, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::rbac::{AuthUser, PolicyEngine};

#[derive(Clone)]
pub struct AuditQueryService {
    engine: PolicyEngine,
    store: Arc<dyn AuditStore>,
    default_limit: u64,
    max_limit: u64,
}

impl AuditQueryService {
    pub fn new(engine: PolicyEngine, store: Arc<dyn AuditStore>) -> Self {
        Self {
            engine,
            store,
            default_limit: DEFAULT_PAGE_SIZE,
            max_limit: MAX_PAGE_SIZE,
        }
    }

    pub fn with_limits(mut self, default_limit: u64, max_limit: u64) -> Self {
        self.default_limit = default_limit;
        self.max_limit = max_limit;
        self
    }

    /// The scope `user` may read, or an audit access denial.
    pub async fn scope_for(&self, user: &AuthUser) -> Result<AuditScope> {
        if self.engine.is_owner(user) {
            return Ok(AuditScope::Organization(user.organization_id));
        }

        let departments: Vec<_> = self
            .engine
            .admin_departments_for_user(user.id)
            .await?
            .into_iter()
            .map(|department| department.id)
            .collect();
        if departments.is_empty() {
            warn!(user_id = %user.id, "Audit log access denied");
            return Err(GateError::audit_access_denied());
        }
        Ok(AuditScope::Departments(departments))
    }

    pub async fn find_all(&self, user: &AuthUser, filters: &AuditFilters) -> Result<Page<AuditLogEntry>> {
        let scope = self.scope_for(user).await?;
        let pagination = OffsetPaginationBuilder::new()
            .page(filters.page)
            .limit(filters.limit)
            .default_limit(self.default_limit)
            .max_limit(self.max_limit)
            .build();

        let (items, total) = self.store.query(&scope, filters, &pagination).await?;
        debug!(
            user_id = %user.id,
            total,
            page = pagination.page,
            limit = pagination.limit,
            "Audit log query"
        );
        Ok(Page::new(items, total, &pagination))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::audit::models::{AuditAction, NewAuditEntry};
    use crate::audit::store::{InMemoryAuditStore, MockAuditStore};
    use crate::error::ErrorCode;
    use crate::rbac::{
        Department, InMemoryDirectory, OrganizationId, PermissionMatrix, Role, RoleAssignment, UserId,
    };

    struct Fixture {
        directory: InMemoryDirectory,
        store: InMemoryAuditStore,
        service: AuditQueryService,
        org: OrganizationId,
    }

    fn fixture() -> Fixture {
        let directory = InMemoryDirectory::new();
        let store = InMemoryAuditStore::new();
        let engine = PolicyEngine::new(Arc::new(directory.clone()), Arc::new(PermissionMatrix::defaults()));
        let service = AuditQueryService::new(engine, Arc::new(store.clone()));
        Fixture { directory, store, service, org: OrganizationId::new() }
    }

    async fn seed(store: &InMemoryAuditStore, org: OrganizationId, department: &Department, count: usize) {
        for _ in 0..count {
            let entry = NewAuditEntry::new(AuditAction::Update, "tasks")
                .actor(UserId::new(), org)
                .details(json!({ "departmentId": department.id.to_string() }))
                .into_entry();
            store.insert(&entry).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_admin_sees_only_admin_departments() {
        let f = fixture();
        let (a, b, c) = (
            Department::new(f.org, "A"),
            Department::new(f.org, "B"),
            Department::new(f.org, "C"),
        );
        for department in [&a, &b, &c] {
            f.directory.add_department(department.clone());
            seed(&f.store, f.org, department, 3).await;
        }
        let user = AuthUser::new(UserId::new(), f.org);
        f.directory.assign(RoleAssignment::new(user.id, a.id, Role::Admin));
        f.directory.assign(RoleAssignment::new(user.id, b.id, Role::Viewer));

        let page = f.service.find_all(&user, &AuditFilters::default()).await.unwrap();
        assert_eq!(page.total, 3);
        assert!(page.items.iter().all(|entry| entry.department_id == Some(a.id)));

        let elsewhere = AuditFilters { department_id: Some(c.id), ..AuditFilters::default() };
        let page = f.service.find_all(&user, &elsewhere).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_viewer_is_refused() {
        let f = fixture();
        let department = Department::new(f.org, "A");
        f.directory.add_department(department.clone());
        let user = AuthUser::new(UserId::new(), f.org);
        f.directory.assign(RoleAssignment::new(user.id, department.id, Role::Viewer));

        let err = f.service.find_all(&user, &AuditFilters::default()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuditAccessDenied);
    }

    #[tokio::test]
    async fn test_owner_pages_whole_organization() {
        let f = fixture();
        let (a, b) = (Department::new(f.org, "A"), Department::new(f.org, "B"));
        seed(&f.store, f.org, &a, 20).await;
        seed(&f.store, f.org, &b, 22).await;
        seed(&f.store, OrganizationId::new(), &a, 5).await;
        let owner = AuthUser::owner(UserId::new(), f.org);

        let filters = AuditFilters { page: Some(2), limit: Some(10), ..AuditFilters::default() };
        let page = f.service.find_all(&owner, &filters).await.unwrap();
        assert_eq!(page.total, 42);
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages, 5);
        assert!(page.items.len() <= 10);
    }

    #[tokio::test]
    async fn test_limit_is_capped() {
        let f = fixture();
        let owner = AuthUser::owner(UserId::new(), f.org);
        let mut store = MockAuditStore::new();
        store
            .expect_query()
            .withf(|_, _, pagination| pagination.limit == 100 && pagination.page == 1)
            .returning(|_, _, _| Ok((Vec::new(), 21)));
        let service = AuditQueryService::new(f.service.engine.clone(), Arc::new(store));

        let filters = AuditFilters { page: Some(0), limit: Some(1_000), ..AuditFilters::default() };
        let page = service.find_all(&owner, &filters).await.unwrap();
        assert_eq!(page.limit, 100);
        assert_eq!(page.total_pages, 1);
    }
}
