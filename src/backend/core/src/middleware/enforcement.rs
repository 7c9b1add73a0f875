//! Tower layer running the authorization pipeline in front of handlers.
//!
//! Apply with `Router::route_layer` so the matched route template and path
//! parameters are available. The authenticated [`AuthUser`] is read from
//! request extensions, where the identity layer put it.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    extract::Request,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::debug;

use super::snapshot::{RequestSnapshot, DEFAULT_MAX_BODY_BYTES};
use crate::audit::{AuditPolicy, AuditRecorder};
use crate::error::{ErrorCode, GateError};
use crate::rbac::{AuthUser, Endpoint, Enforcer};

/// Whether a denial is worth an `access_denied` entry.
fn records_denial(error: &GateError) -> bool {
    matches!(
        error.code(),
        ErrorCode::PermissionDenied | ErrorCode::ContextUnresolvable
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer that wraps services with permission and ownership enforcement.
///
/// # Example
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/tasks/:id", patch(update_task))
///     .route_layer(EnforcementLayer::new(enforcer, recorder, AuditPolicy::default()));
/// ```
#[derive(Clone)]
pub struct EnforcementLayer {
    enforcer: Enforcer,
    recorder: AuditRecorder,
    policy: Arc<AuditPolicy>,
    max_body_bytes: usize,
}

impl EnforcementLayer {
    pub fn new(enforcer: Enforcer, recorder: AuditRecorder, policy: AuditPolicy) -> Self {
        Self {
            enforcer,
            recorder,
            policy: Arc::new(policy),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

impl<S> Layer<S> for EnforcementLayer {
    type Service = EnforcementService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        EnforcementService {
            inner,
            layer: self.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct EnforcementService<S> {
    inner: S,
    layer: EnforcementLayer,
}

impl<S> Service<Request<Body>> for EnforcementService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let layer = self.layer.clone();
        // Drive the clone that was polled ready.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (mut request, snapshot) = RequestSnapshot::ensure(request, layer.max_body_bytes).await;

            let user = request.extensions().get::<AuthUser>().cloned();
            let endpoint = Endpoint::new(snapshot.method.clone(), snapshot.route.clone());
            let mut ctx = snapshot.request_context(user.clone());

            match layer.enforcer.enforce(&endpoint, &mut ctx).await {
                Ok(_) => {
                    debug!(route = %endpoint.route, method = %endpoint.method, "Request authorized");
                    request.extensions_mut().insert(ctx.into_resolved());
                    inner.call(request).await
                }
                Err(err) => {
                    if let Some(user) = user.filter(|_| records_denial(&err)) {
                        let response = serde_json::Value::Null;
                        let resolved = ctx.resolved_department().map(|dept| dept.to_string());
                        if let Some(entry) = layer.policy.denial_entry(&snapshot.facts(&response), &err, resolved) {
                            layer.recorder.spawn(
                                entry
                                    .actor(user.id, user.organization_id)
                                    .ip_address(snapshot.ip_address.clone()),
                            );
                        }
                    }
                    Ok(err.into_response())
                }
            }
        })
    }
}
