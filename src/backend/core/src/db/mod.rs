//! Database layer.
//!
//! Uses PostgreSQL for persistent storage with sqlx. Each store trait has a
//! Postgres implementation here over a shared [`Database`] pool.

mod audit;
mod stores;

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::rbac::PermissionMatrix;

pub use audit::PgAuditStore;
pub use stores::{PgPermissionStore, PgResourceStore, PgRoleStore};

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Insert every row of `matrix` that is not already present.
    pub async fn seed_permissions(&self, matrix: &PermissionMatrix) -> Result<u64> {
        let mut inserted = 0;
        for entry in matrix.entries() {
            let result = sqlx::query(
                r#"
                INSERT INTO permissions (action, resource, role)
                VALUES ($1, $2, $3)
                ON CONFLICT (action, resource, role) DO NOTHING
                "#,
            )
            .bind(entry.permission.action.as_str())
            .bind(entry.permission.resource.as_str())
            .bind(entry.role.as_str())
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }

        info!(inserted, total = matrix.len(), "Permission matrix seeded");
        Ok(inserted)
    }

    /// Round-trip a trivial query.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn role_store(&self) -> PgRoleStore {
        PgRoleStore::new(self.pool.clone())
    }

    pub fn permission_store(&self) -> PgPermissionStore {
        PgPermissionStore::new(self.pool.clone())
    }

    pub fn resource_store(&self) -> PgResourceStore {
        PgResourceStore::new(self.pool.clone())
    }

    pub fn audit_store(&self) -> PgAuditStore {
        PgAuditStore::new(self.pool.clone())
    }
}
