//! Enforcement pipeline: the generic permission guard, then the endpoint's
//! row-level check, over one shared [`RequestContext`].

use std::sync::Arc;

use super::context::{ContextResolver, RequestContext};
use super::guard::{Endpoint, EndpointRequirements, PermissionGuard, Requirement, ResourceCheck};
use super::membership::MembershipGuard;
use super::ownership::TaskOwnershipGuard;
use super::policy::PolicyEngine;
use super::store::ResourceStore;
use crate::error::Result;

/// Runs the guards in a fixed order so the row-level check always sees the
/// resource the permission guard cached.
#[derive(Clone)]
pub struct Enforcer {
    requirements: Arc<EndpointRequirements>,
    permission_guard: PermissionGuard,
    ownership_guard: TaskOwnershipGuard,
    membership_guard: MembershipGuard,
}

impl Enforcer {
    pub fn new(
        engine: PolicyEngine,
        resources: Arc<dyn ResourceStore>,
        requirements: EndpointRequirements,
    ) -> Self {
        let resolver = ContextResolver::new(resources.clone());
        Self {
            requirements: Arc::new(requirements),
            permission_guard: PermissionGuard::new(engine.clone(), resolver),
            ownership_guard: TaskOwnershipGuard::new(engine.clone(), resources),
            membership_guard: MembershipGuard::new(engine),
        }
    }

    pub fn requirement(&self, endpoint: &Endpoint) -> Requirement {
        self.requirements.get(endpoint)
    }

    /// Allow (`Ok`) or the typed reason the request must stop.
    pub async fn enforce(&self, endpoint: &Endpoint, ctx: &mut RequestContext) -> Result<Requirement> {
        let requirement = self.requirement(endpoint);
        self.permission_guard.check(requirement.permission, ctx).await?;
        match requirement.check {
            None => {}
            Some(ResourceCheck::TaskRead) => self.ownership_guard.check_read(ctx).await?,
            Some(ResourceCheck::TaskWrite) => self.ownership_guard.check(ctx).await?,
            Some(ResourceCheck::Membership) => self.membership_guard.check(ctx).await?,
        }
        Ok(requirement)
    }
}
