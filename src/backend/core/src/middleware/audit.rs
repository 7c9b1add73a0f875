//! Audit logging middleware.
//!
//! Records one entry for every successful mutating request once the
//! response is ready. The write is spawned so it never delays or fails the
//! response.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    extract::Request,
    http::header,
    response::Response,
};
use futures::future::BoxFuture;
use serde_json::Value;
use tower::{Layer, Service};
use tracing::warn;

use super::snapshot::{RequestSnapshot, DEFAULT_MAX_BODY_BYTES};
use crate::audit::{AuditPolicy, AuditRecorder};
use crate::rbac::AuthUser;

#[derive(Clone)]
pub struct AuditLayer {
    recorder: AuditRecorder,
    policy: Arc<AuditPolicy>,
    max_body_bytes: usize,
}

impl AuditLayer {
    pub fn new(recorder: AuditRecorder, policy: AuditPolicy) -> Self {
        Self {
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

impl<S> Layer<S> for AuditLayer {
    type Service = AuditService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuditService {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuditService<S> {
    inner: S,
    layer: AuditLayer,
}

impl<S> Service<Request> for AuditService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let layer = self.layer.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if !layer.recorder.is_enabled() || !layer.policy.audits(request.method(), request.uri().path()) {
            return Box::pin(inner.call(request));
        }

        Box::pin(async move {
            let (request, snapshot) = RequestSnapshot::ensure(request, layer.max_body_bytes).await;
            let user = request.extensions().get::<AuthUser>().cloned();

            let response = inner.call(request).await?;
            if !response.status().is_success() {
                return Ok(response);
            }

            let (parts, body) = response.into_parts();
            let is_json = parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.starts_with("application/json"));
            let (body, payload) = if is_json {
                match axum::body::to_bytes(body, usize::MAX).await {
                    Ok(bytes) => {
                        let payload = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
                        (Body::from(bytes), payload)
                    }
                    Err(err) => {
                        warn!(target: "audit", error = %err, "Could not read response body");
                        (Body::empty(), Value::Null)
                    }
                }
            } else {
                (body, Value::Null)
            };

            if let Some(mut entry) = layer.policy.mutation_entry(&snapshot.facts(&payload)) {
                if let Some(user) = user {
                    entry = entry.actor(user.id, user.organization_id);
                }
                layer
                    .recorder
                    .spawn(entry.ip_address(snapshot.ip_address.clone()));
            }

            Ok(Response::from_parts(parts, body))
        })
    }
}
