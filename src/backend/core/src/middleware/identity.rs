//! Identity forwarded by a trusted authentication gateway.
//!
//! Authentication happens upstream. The gateway forwards the verified actor
//! as headers; this layer turns them into an [`AuthUser`] extension. Requests
//! without the headers pass through anonymously and are rejected by whatever
//! requires a user.

use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{extract::Request, http::HeaderMap};
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::debug;

use crate::rbac::{AuthUser, OrganizationId, RoleStore, UserId};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ORGANIZATION_ID_HEADER: &str = "x-organization-id";
pub const OWNER_HEADER: &str = "x-organization-owner";

/// Parse the forwarded identity headers, if all required ones are valid.
pub fn identity_from_headers(headers: &HeaderMap) -> Option<AuthUser> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

    let user_id = UserId::from_str(header(USER_ID_HEADER)?).ok()?;
    let organization_id = OrganizationId::from_str(header(ORGANIZATION_ID_HEADER)?).ok()?;
    let is_owner = header(OWNER_HEADER).is_some_and(|value| value.eq_ignore_ascii_case("true"));

    Some(if is_owner {
        AuthUser::owner(user_id, organization_id)
    } else {
        AuthUser::new(user_id, organization_id)
    })
}

#[derive(Clone, Default)]
pub struct IdentityLayer {
    roles: Option<Arc<dyn RoleStore>>,
}

impl IdentityLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload department assignments onto every identified user.
    pub fn preload_roles(mut self, roles: Arc<dyn RoleStore>) -> Self {
        self.roles = Some(roles);
        self
    }
}

impl<S> Layer<S> for IdentityLayer {
    type Service = IdentityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IdentityService {
            inner,
            roles: self.roles.clone(),
        }
    }
}

#[derive(Clone)]
pub struct IdentityService<S> {
    inner: S,
    roles: Option<Arc<dyn RoleStore>>,
}

impl<S> Service<Request> for IdentityService<S>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let roles = self.roles.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if let Some(mut user) = identity_from_headers(request.headers()) {
                if let Some(roles) = roles.filter(|_| !user.is_owner) {
                    // A failed preload falls back to per-check lookups.
                    match roles.assignments_for_user(user.id).await {
                        Ok(assignments) => user = user.with_roles(assignments),
                        Err(err) => debug!(user_id = %user.id, error = %err, "Role preload failed"),
                    }
                }
                request.extensions_mut().insert(user);
            }
            inner.call(request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_identity_requires_both_ids() {
        let user = UserId::new();
        let org = OrganizationId::new();
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_str(&user.to_string()).unwrap());
        assert!(identity_from_headers(&headers).is_none());

        headers.insert(ORGANIZATION_ID_HEADER, HeaderValue::from_str(&org.to_string()).unwrap());
        let parsed = identity_from_headers(&headers).unwrap();
        assert_eq!(parsed.id, user);
        assert!(!parsed.is_owner);

        headers.insert(OWNER_HEADER, HeaderValue::from_static("true"));
        assert!(identity_from_headers(&headers).unwrap().is_owner);
    }

    #[test]
    fn test_malformed_ids_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        headers.insert(ORGANIZATION_ID_HEADER, HeaderValue::from_static("also-not"));
        assert!(identity_from_headers(&headers).is_none());
    }
}
