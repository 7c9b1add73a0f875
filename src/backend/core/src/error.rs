//! Error handling for Taskgate.
//!
//! This module provides:
//! - A single structured error type with machine-readable codes
//! - HTTP status code mapping for API responses
//! - User-facing messages kept apart from internal detail
//! - Error logging with tracing integration
//! - Metrics integration for error tracking
//!
//! Authorization failures are ordinary values of [`GateError`]; the guards
//! return them and the HTTP layer turns them into responses via
//! [`IntoResponse`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Taskgate operations.
pub type Result<T> = std::result::Result<T, GateError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authorization (4000-4099)
    Unauthenticated,
    PermissionDenied,
    ContextUnresolvable,
    AuditAccessDenied,

    // Lookup (4100-4199)
    ResourceNotFound,

    // Validation (4200-4299)
    ValidationError,

    // Storage (2000-2099)
    DatabaseError,
    DatabaseConnectionFailed,

    // Serialization (2200-2299)
    SerializationError,

    // Configuration (5000-5099)
    ConfigurationError,

    // Internal (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::Unauthenticated => 4000,
            Self::PermissionDenied => 4001,
            Self::ContextUnresolvable => 4002,
            Self::AuditAccessDenied => 4003,
            Self::ResourceNotFound => 4100,
            Self::ValidationError => 4200,
            Self::DatabaseError => 2000,
            Self::DatabaseConnectionFailed => 2001,
            Self::SerializationError => 2200,
            Self::ConfigurationError => 5000,
            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,

            Self::PermissionDenied | Self::ContextUnresolvable | Self::AuditAccessDenied => {
                StatusCode::FORBIDDEN
            }

            Self::ResourceNotFound => StatusCode::NOT_FOUND,

            Self::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,

            Self::DatabaseConnectionFailed => StatusCode::SERVICE_UNAVAILABLE,

            Self::DatabaseError
            | Self::SerializationError
            | Self::ConfigurationError
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this code is an authorization verdict (as opposed to a failure).
    pub const fn is_denial(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied | Self::ContextUnresolvable | Self::AuditAccessDenied
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            2000..=2099 => "database",
            2200..=2299 => "serialization",
            4000..=4099 => "authorization",
            4100..=4199 => "lookup",
            4200..=4299 => "validation",
            5000..=5099 => "configuration",
            _ => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    fn is_empty(&self) -> bool {
        self.context.is_empty() && self.entity_id.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Taskgate.
#[derive(Error, Debug)]
pub struct GateError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl GateError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// No authenticated user was attached to the request.
    pub fn unauthenticated() -> Self {
        Self::new(ErrorCode::Unauthenticated, "Authentication required")
    }

    /// A role, ownership, or matrix check failed.
    pub fn permission_denied(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// The matrix check failed for a declared `action` on `resource`.
    pub fn missing_permission(action: impl fmt::Display, resource: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::PermissionDenied,
            format!("You do not have permission to {} {}", action, resource),
        )
        .with_context("action", action.to_string())
        .with_context("resource", resource.to_string())
    }

    /// No department could be determined for the request.
    pub fn context_unresolvable() -> Self {
        Self::new(
            ErrorCode::ContextUnresolvable,
            "Unable to determine the department for this request",
        )
    }

    /// The caller may not read the audit log.
    pub fn audit_access_denied() -> Self {
        Self::new(
            ErrorCode::AuditAccessDenied,
            "You do not have permission to view the audit log",
        )
    }

    /// Create a not found error.
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found: {}", entity_type, entity_id),
        )
        .with_details(ErrorDetails::new().with_entity(&entity_type, &entity_id))
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Configuration error",
            message,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Whether this error is an authorization denial.
    pub fn is_denial(&self) -> bool {
        self.code.is_denial()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error; client-caused errors stay at `warn` or below.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status().as_u16();

        if self.http_status().is_server_error() {
            error!(
                error_code = %code,
                category = category,
                http_status = status,
                user_message = %self.user_message,
                internal_message = ?self.internal_message,
                source = ?self.source,
                "Request failed"
            );
        } else if self.code.is_denial() {
            warn!(
                error_code = %code,
                category = category,
                http_status = status,
                user_message = %self.user_message,
                "Request denied"
            );
        } else {
            tracing::debug!(
                error_code = %code,
                category = category,
                http_status = status,
                user_message = %self.user_message,
                "Request rejected"
            );
        }
    }

    fn record_metrics(&self) {
        counter!(
            "taskgate_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false for errors
    pub success: bool,

    pub error: ErrorInfo,
}

/// Detailed error information for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,

    pub numeric_code: u32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,

    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&GateError> for ErrorResponse {
    fn from(error: &GateError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                details: if error.details.is_empty() {
                    None
                } else {
                    Some(error.details.clone())
                },
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for GateError {
    fn from(error: sqlx::Error) -> Self {
        let (code, user_msg) = match &error {
            sqlx::Error::RowNotFound => (
                ErrorCode::ResourceNotFound,
                "The requested record was not found",
            ),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => (
                ErrorCode::DatabaseConnectionFailed,
                "Unable to connect to the database",
            ),
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<sqlx::migrate::MigrateError> for GateError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::with_internal(
            ErrorCode::DatabaseError,
            "Database migration failed",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<serde_json::Error> for GateError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to process JSON data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<std::io::Error> for GateError {
    fn from(error: std::io::Error) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An I/O error occurred",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<config::ConfigError> for GateError {
    fn from(error: config::ConfigError) -> Self {
        Self::configuration(error.to_string()).with_source(error)
    }
}

impl From<anyhow::Error> for GateError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", error))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::Unauthenticated.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::PermissionDenied.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::AuditAccessDenied.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::ContextUnresolvable.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::ResourceNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::DatabaseError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_is_not_a_denial() {
        let error = GateError::not_found("task", "abc");
        assert_eq!(error.code(), ErrorCode::ResourceNotFound);
        assert!(!error.is_denial());
        assert!(GateError::permission_denied("no").is_denial());
    }

    #[test]
    fn test_missing_permission_names_action_and_resource() {
        let error = GateError::missing_permission("delete", "task");
        assert!(error.user_message().contains("delete"));
        assert!(error.user_message().contains("task"));
        assert_eq!(error.details().context["action"], "delete");
    }

    #[test]
    fn test_error_response_serialization() {
        let error = GateError::unauthenticated();
        let response = ErrorResponse::from(&error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("UNAUTHENTICATED"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_error_display() {
        let error = GateError::with_internal(
            ErrorCode::DatabaseError,
            "A database error occurred",
            "connection reset",
        );

        let display = format!("{}", error);
        assert!(display.contains("DatabaseError"));
        assert!(display.contains("connection reset"));
    }
}
