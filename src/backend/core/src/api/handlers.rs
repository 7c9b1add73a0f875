//! HTTP handlers owned by this service.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use super::AppState;
use crate::audit::{AuditFilters, AuditLogEntry};
use crate::error::{GateError, Result};
use crate::pagination::Page;
use crate::rbac::AuthUser;

// ═══════════════════════════════════════════════════════════════════════════════
// Health
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db {
        Some(db) => match db.health_check().await {
            Ok(()) => "up",
            Err(_) => "down",
        },
        None => "not_configured",
    };
    let status = if database == "down" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(serde_json::json!({
            "status": if status.is_success() { "healthy" } else { "degraded" },
            "database": database,
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Audit Log
// ═══════════════════════════════════════════════════════════════════════════════

/// `GET /audit-logs`
pub async fn list_audit_logs(
    State(state): State<AppState>,
    user: AuthUser,
    filters: std::result::Result<Query<AuditFilters>, QueryRejection>,
) -> Result<Json<Page<AuditLogEntry>>> {
    let Query(filters) =
        filters.map_err(|rejection| GateError::validation(rejection.body_text()))?;
    let page = state.audit_query.find_all(&user, &filters).await?;
    Ok(Json(page))
}
