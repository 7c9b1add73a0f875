//! PostgreSQL audit store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::audit::{AuditFilters, AuditLogEntry, AuditScope, AuditStore};
use crate::error::{GateError, Result};
use crate::pagination::OffsetPagination;
use crate::rbac::{DepartmentId, OrganizationId, UserId};

const AUDIT_COLUMNS: &str = "id, action, resource, resource_id, user_id, ip_address, details, \
                             department_id, organization_id, created_at";

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    action: String,
    resource: String,
    resource_id: Option<String>,
    user_id: Uuid,
    ip_address: Option<String>,
    details: Value,
    department_id: Option<Uuid>,
    organization_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = GateError;

    fn try_from(row: AuditRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            action: row.action.parse().map_err(GateError::internal)?,
            resource: row.resource,
            resource_id: row.resource_id,
            user_id: UserId(row.user_id),
            ip_address: row.ip_address,
            details: row.details,
            department_id: row.department_id.map(DepartmentId),
            organization_id: row.organization_id.map(OrganizationId),
            created_at: row.created_at,
        })
    }
}

/// Scope and filters as a `WHERE` clause; every value is a bound parameter.
fn push_where(builder: &mut QueryBuilder<'_, Postgres>, scope: &AuditScope, filters: &AuditFilters) {
    match scope {
        AuditScope::Organization(org) => {
            builder.push(" WHERE organization_id = ").push_bind(org.0);
        }
        AuditScope::Departments(departments) => {
            let ids: Vec<Uuid> = departments.iter().map(|dept| dept.0).collect();
            builder.push(" WHERE department_id = ANY(").push_bind(ids).push(")");
        }
    }

    if let Some(from) = filters.date_from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filters.date_to {
        builder.push(" AND created_at <= ").push_bind(to);
    }
    if let Some(user_id) = filters.user_id {
        builder.push(" AND user_id = ").push_bind(user_id.0);
    }
    if let Some(action) = filters.action {
        builder.push(" AND action = ").push_bind(action.as_str());
    }
    if let Some(resource) = &filters.resource {
        builder.push(" AND resource = ").push_bind(resource.clone());
    }
    if let Some(department_id) = filters.department_id {
        builder.push(" AND department_id = ").push_bind(department_id.0);
    }
}

#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn insert(&self, entry: &AuditLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, action, resource, resource_id, user_id, ip_address,
                                    details, department_id, organization_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.action.as_str())
        .bind(&entry.resource)
        .bind(&entry.resource_id)
        .bind(entry.user_id)
        .bind(&entry.ip_address)
        .bind(&entry.details)
        .bind(entry.department_id)
        .bind(entry.organization_id)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(
        &self,
        scope: &AuditScope,
        filters: &AuditFilters,
        pagination: &OffsetPagination,
    ) -> Result<(Vec<AuditLogEntry>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        push_where(&mut count, scope, filters);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM audit_logs", AUDIT_COLUMNS));
        push_where(&mut select, scope, filters);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(pagination.limit as i64)
            .push(" OFFSET ")
            .push_bind(pagination.offset() as i64);

        let rows: Vec<AuditRow> = select.build_query_as().fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(AuditLogEntry::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((items, total.max(0) as u64))
    }
}
