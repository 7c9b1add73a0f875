//! When to audit a request and how an entry is derived from it.

use std::collections::HashMap;

use axum::http::Method;
use serde_json::{json, Map, Value};

use super::models::{AuditAction, NewAuditEntry};
use crate::error::GateError;
use crate::rbac::{DEPARTMENT_KEY, RESOURCE_ID_PARAM};

/// Field name fragments never written to an audit entry.
const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "credential",
    "private_key",
    "access_token",
    "refresh_token",
    "authorization",
];

const MEMBERSHIP_COLLECTION: &str = "members";
const DEPARTMENT_COLLECTION: &str = "departments";

pub fn is_sensitive_field(name: &str) -> bool {
    let lower = name.to_lowercase();
    SENSITIVE_FIELDS.iter().any(|pattern| lower.contains(pattern))
}

/// Copy of `value` with credential-like fields removed at every depth.
pub fn sanitize_body(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !is_sensitive_field(key))
                .map(|(key, value)| (key.clone(), sanitize_body(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_body).collect()),
        other => other.clone(),
    }
}

pub fn action_for_method(method: &Method) -> Option<AuditAction> {
    match *method {
        Method::POST => Some(AuditAction::Create),
        Method::PUT | Method::PATCH => Some(AuditAction::Update),
        Method::DELETE => Some(AuditAction::Delete),
        _ => None,
    }
}

/// Target collection of a route template: its last literal segment.
pub fn resource_from_route(route: &str) -> Option<&str> {
    route
        .split('/')
        .filter(|segment| !segment.is_empty() && !segment.starts_with(':'))
        .last()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Request facts
// ═══════════════════════════════════════════════════════════════════════════════

/// What the pipeline knows about a finished request.
#[derive(Debug, Clone, Copy)]
pub struct RequestFacts<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    /// Matched route template, e.g. `/tasks/:id`.
    pub route: &'a str,
    pub params: &'a HashMap<String, String>,
    pub body: &'a Value,
    /// Response JSON; `Value::Null` when unavailable.
    pub response: &'a Value,
}

impl<'a> RequestFacts<'a> {
    /// The affected entity in the response, unwrapping a `data` envelope.
    fn entity(&self) -> &'a Value {
        match self.response.get("data") {
            Some(data) if data.is_object() => data,
            _ => self.response,
        }
    }

    /// Value of the last `:param` in the route, e.g. `userId` for a member.
    fn last_param(&self) -> Option<String> {
        self.route
            .split('/')
            .filter_map(|segment| segment.strip_prefix(':'))
            .last()
            .and_then(|name| self.params.get(name))
            .cloned()
    }

    /// Id of a membership sub-resource's parent department.
    fn membership_parent(&self) -> Option<String> {
        let segments: Vec<&str> = self.route.split('/').filter(|s| !s.is_empty()).collect();
        segments.windows(3).find_map(|window| match window {
            [DEPARTMENT_COLLECTION, param, MEMBERSHIP_COLLECTION] => param
                .strip_prefix(':')
                .and_then(|name| self.params.get(name))
                .cloned(),
            _ => None,
        })
    }
}

fn as_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Decides which requests are audited and derives their entries.
#[derive(Debug, Clone)]
pub struct AuditPolicy {
    skip_prefixes: Vec<String>,
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self::new(vec!["/auth".to_string(), "/audit-logs".to_string()])
    }
}

impl AuditPolicy {
    pub fn new(skip_prefixes: Vec<String>) -> Self {
        Self { skip_prefixes }
    }

    pub fn is_skipped(&self, path: &str) -> bool {
        self.skip_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Whether a successful request with this method and path is recorded.
    pub fn audits(&self, method: &Method, path: &str) -> bool {
        action_for_method(method).is_some() && !self.is_skipped(path)
    }

    /// Entry for a successful mutation, without actor or address.
    pub fn mutation_entry(&self, facts: &RequestFacts<'_>) -> Option<NewAuditEntry> {
        if !self.audits(facts.method, facts.path) {
            return None;
        }
        let action = action_for_method(facts.method)?;
        let resource = resource_from_route(facts.route)?;

        let resource_id = match action {
            AuditAction::Create => as_id(facts.entity().get("id")),
            _ => facts
                .params
                .get(RESOURCE_ID_PARAM)
                .cloned()
                .or_else(|| facts.last_param()),
        };

        let mut details = Map::new();
        details.insert("path".into(), json!(facts.path));
        if !facts.body.is_null() {
            details.insert("body".into(), sanitize_body(facts.body));
        }
        if let Some(department_id) = derive_department(resource, resource_id.as_deref(), facts) {
            details.insert(DEPARTMENT_KEY.into(), json!(department_id));
        }

        Some(
            NewAuditEntry::new(action, resource)
                .resource_id(resource_id)
                .details(Value::Object(details)),
        )
    }

    /// `access_denied` entry tagging the action the actor attempted.
    pub fn denial_entry(
        &self,
        facts: &RequestFacts<'_>,
        error: &GateError,
        resolved_department: Option<String>,
    ) -> Option<NewAuditEntry> {
        if self.is_skipped(facts.path) {
            return None;
        }
        let attempted = action_for_method(facts.method).map_or("read", |action| action.as_str());
        let resource = resource_from_route(facts.route).unwrap_or(facts.path);

        let mut details = Map::new();
        details.insert("attemptedAction".into(), json!(attempted));
        details.insert("reason".into(), json!(error.code()));
        details.insert("path".into(), json!(facts.path));
        let department_id = resolved_department.or_else(|| {
            let target = facts.params.get(RESOURCE_ID_PARAM).map(String::as_str);
            derive_department(resource, target, facts)
        });
        if let Some(department_id) = department_id {
            details.insert(DEPARTMENT_KEY.into(), json!(department_id));
        }

        Some(
            NewAuditEntry::new(AuditAction::AccessDenied, resource)
                .resource_id(facts.params.get(RESOURCE_ID_PARAM).cloned())
                .details(Value::Object(details)),
        )
    }
}

/// Department attribution, first match wins: body, membership parent, path
/// parameter, affected entity, then a department's own id.
fn derive_department(resource: &str, resource_id: Option<&str>, facts: &RequestFacts<'_>) -> Option<String> {
    as_id(facts.body.get(DEPARTMENT_KEY))
        .or_else(|| facts.membership_parent())
        .or_else(|| facts.params.get(DEPARTMENT_KEY).cloned())
        .or_else(|| as_id(facts.entity().get(DEPARTMENT_KEY)))
        .or_else(|| {
            (resource == DEPARTMENT_COLLECTION)
                .then(|| resource_id.map(str::to_owned))
                .flatten()
        })
}
