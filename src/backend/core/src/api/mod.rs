//! HTTP surface: shared state, the audit-log endpoint, and router assembly.
//!
//! The task service mounts its own routes through [`build_router`]; every
//! route then runs behind the same pipeline:
//!
//! 1. [`IdentityLayer`] attaches the forwarded [`AuthUser`](crate::rbac::AuthUser)
//! 2. [`AuditLayer`] records successful mutations after the response
//! 3. [`EnforcementLayer`] runs the permission guard, then the ownership guard

mod extract;
mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::audit::{AuditPolicy, AuditQueryService, AuditRecorder, AuditStore, InMemoryAuditStore};
use crate::config::{AuditConfig, PaginationConfig};
use crate::db::Database;
use crate::middleware::{AuditLayer, EnforcementLayer, IdentityLayer, DEFAULT_MAX_BODY_BYTES};
use crate::rbac::{
    EndpointRequirements, Enforcer, InMemoryDirectory, PermissionMatrix, PermissionStore,
    PolicyEngine, ResourceStore, RoleStore,
};

pub use handlers::{health_check, list_audit_logs};

/// The store implementations a deployment runs on.
#[derive(Clone)]
pub struct Stores {
    pub roles: Arc<dyn RoleStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub resources: Arc<dyn ResourceStore>,
    pub audit: Arc<dyn AuditStore>,
}

impl Stores {
    pub fn postgres(db: &Database) -> Self {
        Self {
            roles: Arc::new(db.role_store()),
            permissions: Arc::new(db.permission_store()),
            resources: Arc::new(db.resource_store()),
            audit: Arc::new(db.audit_store()),
        }
    }

    /// In-memory stores with the default permission matrix.
    pub fn in_memory(directory: InMemoryDirectory, audit: InMemoryAuditStore) -> Self {
        Self {
            roles: Arc::new(directory.clone()),
            permissions: Arc::new(PermissionMatrix::defaults()),
            resources: Arc::new(directory),
            audit: Arc::new(audit),
        }
    }
}

/// Application state shared across handlers and layers.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub enforcer: Enforcer,
    pub recorder: AuditRecorder,
    pub audit_policy: AuditPolicy,
    pub audit_query: AuditQueryService,
    pub max_body_bytes: usize,
    pub db: Option<Database>,
}

impl AppState {
    pub fn new(stores: Stores, requirements: EndpointRequirements) -> Self {
        let engine = PolicyEngine::new(stores.roles.clone(), stores.permissions.clone());
        Self {
            enforcer: Enforcer::new(engine.clone(), stores.resources.clone(), requirements),
            recorder: AuditRecorder::new(stores.audit.clone()),
            audit_policy: AuditPolicy::default(),
            audit_query: AuditQueryService::new(engine, stores.audit.clone()),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            db: None,
            stores,
        }
    }

    pub fn with_audit_config(mut self, config: &AuditConfig) -> Self {
        self.recorder = if config.enabled {
            AuditRecorder::new(self.stores.audit.clone())
        } else {
            AuditRecorder::disabled(self.stores.audit.clone())
        };
        self.audit_policy = AuditPolicy::new(config.skip_prefixes.clone());
        self.max_body_bytes = config.max_body_bytes;
        self
    }

    pub fn with_pagination(mut self, config: &PaginationConfig) -> Self {
        self.audit_query = self
            .audit_query
            .with_limits(config.default_limit, config.max_limit);
        self
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }
}

/// Build the router: this service's endpoints merged with `service_routes`,
/// all behind the enforcement and audit pipeline.
///
/// # Example
///
/// ```rust,ignore
/// let tasks = Router::new().route("/tasks/:id", patch(update_task));
/// let app = build_router(state, tasks);
/// ```
pub fn build_router(state: AppState, service_routes: Router<AppState>) -> Router {
    let enforcement = EnforcementLayer::new(
        state.enforcer.clone(),
        state.recorder.clone(),
        state.audit_policy.clone(),
    )
    .max_body_bytes(state.max_body_bytes);
    let audit = AuditLayer::new(state.recorder.clone(), state.audit_policy.clone())
        .max_body_bytes(state.max_body_bytes);
    let identity = IdentityLayer::new().preload_roles(state.stores.roles.clone());

    Router::new()
        .route("/audit-logs", get(list_audit_logs))
        .merge(service_routes)
        // Route layers: the last one added runs first.
        .route_layer(enforcement)
        .route_layer(audit)
        .route("/health", get(health_check))
        .layer(identity)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
