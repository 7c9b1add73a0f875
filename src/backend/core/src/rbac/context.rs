//! Per-request authorization context and department resolution.
//!
//! A [`RequestContext`] is created once per request and passed by mutable
//! reference through every enforcement stage. It owns the resource cache:
//! whichever stage loads the target resource first stores it here, and later
//! stages (and the handler, via [`ResolvedContext`]) reuse that snapshot.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::models::{AuthUser, Department, DepartmentId, Resource, Task, TaskId};
use super::store::ResourceStore;
use crate::error::{GateError, Result};

/// Field name carrying an explicit department in body, path, and query.
pub const DEPARTMENT_KEY: &str = "departmentId";

/// Path parameter naming the targeted resource.
pub const RESOURCE_ID_PARAM: &str = "id";

// ═══════════════════════════════════════════════════════════════════════════════
// Cached resource
// ═══════════════════════════════════════════════════════════════════════════════

/// A target resource loaded during enforcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedResource {
    Task(Task),
    Department(Department),
}

impl LoadedResource {
    pub fn department_id(&self) -> DepartmentId {
        match self {
            Self::Task(task) => task.department_id,
            Self::Department(department) => department.id,
        }
    }

    /// Whether this is the `resource` with raw id `id`.
    pub fn is(&self, resource: Resource, id: uuid::Uuid) -> bool {
        match (self, resource) {
            (Self::Task(task), Resource::Task) => task.id.0 == id,
            (Self::Department(department), Resource::Department) => department.id.0 == id,
            _ => false,
        }
    }

    pub fn as_task(&self) -> Option<&Task> {
        match self {
            Self::Task(task) => Some(task),
            Self::Department(_) => None,
        }
    }
}

/// Where the department of a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartmentSource {
    Body,
    PathParams,
    Query,
    TargetResource,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Request context
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the guards may look at for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user: Option<AuthUser>,
    pub body: Value,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    resource: Option<LoadedResource>,
    department: Option<DepartmentId>,
}

impl RequestContext {
    pub fn new(user: Option<AuthUser>) -> Self {
        Self {
            user,
            body: Value::Null,
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Raw `id` path parameter, if the route targets a single resource.
    pub fn target_id(&self) -> Option<&str> {
        self.params.get(RESOURCE_ID_PARAM).map(String::as_str)
    }

    /// `departmentId` from the JSON body.
    ///
    /// A present but malformed value is an error rather than a fall-through,
    /// so a bad body can never be silently resolved through a weaker source.
    pub fn body_department(&self) -> Result<Option<DepartmentId>> {
        match self.body.get(DEPARTMENT_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) => parse_department(raw).map(Some),
            Some(_) => Err(GateError::validation("departmentId must be a string")),
        }
    }

    pub fn param_department(&self) -> Result<Option<DepartmentId>> {
        self.params
            .get(DEPARTMENT_KEY)
            .map(|raw| parse_department(raw))
            .transpose()
    }

    pub fn query_department(&self) -> Result<Option<DepartmentId>> {
        self.query
            .get(DEPARTMENT_KEY)
            .map(|raw| parse_department(raw))
            .transpose()
    }

    pub fn cached_resource(&self) -> Option<&LoadedResource> {
        self.resource.as_ref()
    }

    pub fn cache_resource(&mut self, resource: LoadedResource) {
        self.resource = Some(resource);
    }

    /// The cached task, if the cache holds the task with this id.
    pub fn cached_task(&self, task_id: TaskId) -> Option<&Task> {
        self.resource
            .as_ref()
            .and_then(LoadedResource::as_task)
            .filter(|task| task.id == task_id)
    }

    pub fn resolved_department(&self) -> Option<DepartmentId> {
        self.department
    }

    /// What downstream handlers get to see once enforcement passed.
    pub fn into_resolved(self) -> ResolvedContext {
        ResolvedContext {
            department_id: self.department,
            resource: self.resource,
        }
    }
}

fn parse_department(raw: &str) -> Result<DepartmentId> {
    DepartmentId::from_str(raw)
        .map_err(|_| GateError::validation("departmentId is not a valid identifier"))
}

/// Department and resource resolved during enforcement, handed to handlers
/// through request extensions so they can skip a repeat lookup.
#[derive(Debug, Clone, Default)]
pub struct ResolvedContext {
    pub department_id: Option<DepartmentId>,
    pub resource: Option<LoadedResource>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════════════════════════════════════════

/// Finds the department a request concerns.
#[derive(Clone)]
pub struct ContextResolver {
    resources: Arc<dyn ResourceStore>,
}

impl ContextResolver {
    pub fn new(resources: Arc<dyn ResourceStore>) -> Self {
        Self { resources }
    }

    /// Resolve in fixed order: body, path params, query, then the target
    /// resource's own department. Create requests carry the department in the
    /// body; update and delete requests only carry a resource id in the path.
    pub async fn resolve_department(
        &self,
        ctx: &mut RequestContext,
        resource: Resource,
    ) -> Result<Option<(DepartmentId, DepartmentSource)>> {
        let explicit = [
            (ctx.body_department()?, DepartmentSource::Body),
            (ctx.param_department()?, DepartmentSource::PathParams),
            (ctx.query_department()?, DepartmentSource::Query),
        ];
        let mut resolved = explicit
            .into_iter()
            .find_map(|(department, source)| department.map(|d| (d, source)));

        if resolved.is_none() {
            resolved = self
                .load_target(ctx, resource)
                .await?
                .map(|department| (department, DepartmentSource::TargetResource));
        }

        if let Some((department_id, source)) = resolved {
            debug!(department_id = %department_id, source = ?source, "Resolved department");
            ctx.department = Some(department_id);
        }
        Ok(resolved)
    }

    async fn load_target(
        &self,
        ctx: &mut RequestContext,
        resource: Resource,
    ) -> Result<Option<DepartmentId>> {
        let Some(raw_id) = ctx.target_id() else {
            return Ok(None);
        };
        let Ok(id) = uuid::Uuid::parse_str(raw_id) else {
            return Ok(None);
        };

        if let Some(cached) = ctx.cached_resource().filter(|cached| cached.is(resource, id)) {
            return Ok(Some(cached.department_id()));
        }

        let loaded = match resource {
            Resource::Task => self
                .resources
                .find_task(TaskId(id), true)
                .await?
                .map(LoadedResource::Task),
            Resource::Department => self
                .resources
                .find_department(DepartmentId(id))
                .await?
                .map(LoadedResource::Department),
            Resource::Member | Resource::AuditLog => None,
        };

        Ok(loaded.map(|loaded| {
            let department_id = loaded.department_id();
            ctx.cache_resource(loaded);
            department_id
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::{OrganizationId, UserId};
    use crate::rbac::store::{InMemoryDirectory, MockResourceStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_body_wins_over_params_and_query() {
        let (body, param, query) = (DepartmentId::new(), DepartmentId::new(), DepartmentId::new());
        let mut resources = MockResourceStore::new();
        resources.expect_find_task().never();
        let resolver = ContextResolver::new(Arc::new(resources));

        let mut ctx = RequestContext::new(None)
            .with_body(json!({ "departmentId": body.to_string() }))
            .with_param(DEPARTMENT_KEY, param.to_string())
            .with_query(DEPARTMENT_KEY, query.to_string());

        let resolved = resolver.resolve_department(&mut ctx, Resource::Task).await.unwrap();
        assert_eq!(resolved, Some((body, DepartmentSource::Body)));
        assert_eq!(ctx.resolved_department(), Some(body));
    }

    #[tokio::test]
    async fn test_params_win_over_query() {
        let (param, query) = (DepartmentId::new(), DepartmentId::new());
        let resolver = ContextResolver::new(Arc::new(InMemoryDirectory::new()));
        let mut ctx = RequestContext::new(None)
            .with_param(DEPARTMENT_KEY, param.to_string())
            .with_query(DEPARTMENT_KEY, query.to_string());

        let resolved = resolver.resolve_department(&mut ctx, Resource::Member).await.unwrap();
        assert_eq!(resolved, Some((param, DepartmentSource::PathParams)));
    }

    #[tokio::test]
    async fn test_falls_back_to_target_task_and_caches_it() {
        let directory = InMemoryDirectory::new();
        let dept = DepartmentId::new();
        let mut task = Task::new(dept, UserId::new(), "Archived");
        task.deleted_at = Some(chrono::Utc::now());
        directory.add_task(task.clone());
        let resolver = ContextResolver::new(Arc::new(directory.clone()));

        let mut ctx = RequestContext::new(None).with_param(RESOURCE_ID_PARAM, task.id.to_string());
        let resolved = resolver.resolve_department(&mut ctx, Resource::Task).await.unwrap();

        assert_eq!(resolved, Some((dept, DepartmentSource::TargetResource)));
        assert_eq!(ctx.cached_task(task.id), Some(&task));

        resolver.resolve_department(&mut ctx, Resource::Task).await.unwrap();
        assert_eq!(directory.task_lookups(), 1);
    }

    #[tokio::test]
    async fn test_cache_for_another_resource_is_not_trusted() {
        let directory = InMemoryDirectory::new();
        let dept = DepartmentId::new();
        let task = Task::new(dept, UserId::new(), "Target");
        directory.add_task(task.clone());
        let resolver = ContextResolver::new(Arc::new(directory.clone()));

        let stale = Task::new(DepartmentId::new(), UserId::new(), "Stale");
        let mut ctx = RequestContext::new(None).with_param(RESOURCE_ID_PARAM, task.id.to_string());
        ctx.cache_resource(LoadedResource::Task(stale));

        let resolved = resolver.resolve_department(&mut ctx, Resource::Task).await.unwrap();
        assert_eq!(resolved, Some((dept, DepartmentSource::TargetResource)));
        assert_eq!(ctx.cached_task(task.id), Some(&task));
        assert_eq!(directory.task_lookups(), 1);
    }

    #[tokio::test]
    async fn test_department_route_resolves_to_itself() {
        let directory = InMemoryDirectory::new();
        let department = Department::new(OrganizationId::new(), "Ops");
        directory.add_department(department.clone());
        let resolver = ContextResolver::new(Arc::new(directory));

        let mut ctx = RequestContext::new(None).with_param(RESOURCE_ID_PARAM, department.id.to_string());
        let resolved = resolver.resolve_department(&mut ctx, Resource::Department).await.unwrap();
        assert_eq!(resolved, Some((department.id, DepartmentSource::TargetResource)));
    }

    #[tokio::test]
    async fn test_nothing_to_resolve() {
        let resolver = ContextResolver::new(Arc::new(InMemoryDirectory::new()));

        let mut empty = RequestContext::new(None);
        assert_eq!(resolver.resolve_department(&mut empty, Resource::Task).await.unwrap(), None);

        let mut missing = RequestContext::new(None).with_param(RESOURCE_ID_PARAM, TaskId::new().to_string());
        assert_eq!(resolver.resolve_department(&mut missing, Resource::Task).await.unwrap(), None);
        assert!(missing.cached_resource().is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_department_is_rejected() {
        let resolver = ContextResolver::new(Arc::new(InMemoryDirectory::new()));
        let mut ctx = RequestContext::new(None).with_body(json!({ "departmentId": 42 }));
        assert!(resolver.resolve_department(&mut ctx, Resource::Task).await.is_err());
    }
}
