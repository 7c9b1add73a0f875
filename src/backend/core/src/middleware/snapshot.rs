//! Request snapshot shared by the enforcement and audit layers.
//!
//! The body is buffered once, parsed as JSON when possible, and put back on
//! the request so the handler still receives it. Bodies over the limit are
//! passed through unread and snapshot as `null`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, FromRequestParts, MatchedPath, Query, RawPathParams, Request},
    http::{header, HeaderMap, Method},
};
use futures::{stream, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::audit::RequestFacts;
use crate::rbac::{AuthUser, RequestContext};

/// Default bound on buffered request bodies.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// What the pipeline knows about a request before its handler runs.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: Method,
    pub path: String,
    /// Matched route template; the raw path when no route matched.
    pub route: String,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Value,
    pub ip_address: Option<String>,
}

impl RequestSnapshot {
    /// Snapshot `request` unless an earlier layer already did.
    pub async fn ensure(request: Request, max_body_bytes: usize) -> (Request, Arc<Self>) {
        if let Some(existing) = request.extensions().get::<Arc<Self>>().cloned() {
            return (request, existing);
        }

        let (mut parts, body) = request.into_parts();

        let params = match RawPathParams::from_request_parts(&mut parts, &()).await {
            Ok(raw) => raw
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            Err(_) => HashMap::new(),
        };
        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(query)| query)
            .unwrap_or_default();
        let route = parts
            .extensions
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);

        let (body, json) = buffer_json(&parts.headers, body, max_body_bytes).await;

        let snapshot = Arc::new(Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            route,
            params,
            query,
            body: json,
            ip_address: client_ip(&parts.headers, remote_addr),
        });
        parts.extensions.insert(snapshot.clone());

        (Request::from_parts(parts, body), snapshot)
    }

    /// Authorization context over this snapshot.
    pub fn request_context(&self, user: Option<AuthUser>) -> RequestContext {
        let mut ctx = RequestContext::new(user).with_body(self.body.clone());
        ctx.params = self.params.clone();
        ctx.query = self.query.clone();
        ctx
    }

    pub fn facts<'a>(&'a self, response: &'a Value) -> RequestFacts<'a> {
        RequestFacts {
            method: &self.method,
            path: &self.path,
            route: &self.route,
            params: &self.params,
            body: &self.body,
            response,
        }
    }
}

async fn buffer_json(headers: &HeaderMap, body: Body, limit: usize) -> (Body, Value) {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|length| length > limit) {
        debug!(length = ?declared, limit, "Body over snapshot limit, not captured");
        return (body, Value::Null);
    }

    let mut frames = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut size = 0usize;
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(chunk) if size + chunk.len() <= limit => {
                size += chunk.len();
                chunks.push(chunk);
            }
            // Over the limit or unreadable: hand everything to the handler as it came.
            stopped => {
                debug!(limit, "Body not captured");
                let replay = stream::iter(chunks.into_iter().map(Ok).chain(std::iter::once(stopped)));
                return (Body::from_stream(replay.chain(frames)), Value::Null);
            }
        }
    }

    let bytes = chunks.concat();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (Body::from(bytes), json)
}

/// First `x-forwarded-for` hop, then `x-real-ip`, then the peer address.
pub fn client_ip(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> Option<String> {
    for name in ["x-forwarded-for", "x-real-ip"] {
        if let Some(value) = headers.get(name).and_then(|value| value.to_str().ok()) {
            let first = value.split(',').next().unwrap_or(value).trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    remote_addr.map(|addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("203.0.113.9"));

        headers.remove("x-forwarded-for");
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("10.0.0.2"));

        assert_eq!(client_ip(&HeaderMap::new(), Some(peer)).as_deref(), Some("127.0.0.1"));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }

    #[tokio::test]
    async fn test_snapshot_keeps_body_for_handler() {
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/tasks?departmentId=abc")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"title":"x"}"#))
            .unwrap();

        let (request, snapshot) = RequestSnapshot::ensure(request, DEFAULT_MAX_BODY_BYTES).await;
        assert_eq!(snapshot.body["title"], "x");
        assert_eq!(snapshot.query.get("departmentId").map(String::as_str), Some("abc"));
        assert_eq!(snapshot.route, "/tasks");

        let (again, same) = RequestSnapshot::ensure(request, DEFAULT_MAX_BODY_BYTES).await;
        assert!(Arc::ptr_eq(&snapshot, &same));
        let bytes = axum::body::to_bytes(again.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], br#"{"title":"x"}"#);
    }

    #[tokio::test]
    async fn test_oversized_body_passes_through_uncaptured() {
        let payload = vec![b'a'; 64];
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/tasks")
            .body(Body::from(payload.clone()))
            .unwrap();

        let (request, snapshot) = RequestSnapshot::ensure(request, 16).await;
        assert!(snapshot.body.is_null());
        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], &payload[..]);
    }

    #[tokio::test]
    async fn test_declared_oversized_body_is_not_read() {
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/tasks")
            .header(header::CONTENT_LENGTH, "64")
            .body(Body::from(vec![b'{'; 64]))
            .unwrap();

        let (request, snapshot) = RequestSnapshot::ensure(request, 16).await;
        assert!(snapshot.body.is_null());
        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.len(), 64);
    }
}
