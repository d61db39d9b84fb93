//! Dashboard read API

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{audit_denied, client_ip, AppState};
use crate::auth;
use crate::db::{AuditLogEntry, AuditQuery, AuditStatus, NewAuditEntry};
use crate::error::PublicError;

#[derive(Debug, Deserialize)]
pub struct AttackLogsQuery {
    #[serde(default = "default_hours")]
    pub hours: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_hours() -> i64 {
    24
}

fn default_limit() -> i64 {
    500
}

/// API: attack records for the trailing window, newest first. Served
/// fresh on every call - the dashboard's real-time property depends on it.
pub async fn attack_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AttackLogsQuery>,
) -> Result<impl IntoResponse, PublicError> {
    let records = state
        .db
        .recent_attacks(query.hours.max(1), query.limit)
        .await
        .map_err(|e| e.sanitize("ATTACK-LOGS"))?;
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(records)))
}

/// API: trailing-24h severity rollup, one entry per hour, zero-filled.
pub async fn hourly_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, PublicError> {
    let buckets = state
        .db
        .hourly_stats()
        .await
        .map_err(|e| e.sanitize("HOURLY-STATS"))?;
    Ok(Json(buckets))
}

/// API: headline counters for the dashboard.
pub async fn threat_activity(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, PublicError> {
    let totals = state
        .db
        .threat_totals()
        .await
        .map_err(|e| e.sanitize("THREAT-ACTIVITY"))?;
    Ok(Json(totals))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AuditLogsResponse {
    pub logs: Vec<AuditLogEntry>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// API: filtered audit trail page. Admin-only; the read itself is audited.
pub async fn audit_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AuditLogsQuery>,
) -> Result<impl IntoResponse, PublicError> {
    let admin = match auth::require_admin(state.identity.as_ref(), &state.db, &headers).await {
        Ok(user) => user,
        Err(failure) => {
            audit_denied(&state, "VIEW_AUDIT_LOGS", &failure, &headers).await;
            return Err(crate::error::AppError::Unauthorized.sanitize("AUDIT-LOGS"));
        }
    };

    let status = match query.status.as_deref() {
        None => None,
        Some(s) => match AuditStatus::parse(s) {
            Some(parsed) => Some(parsed),
            None => {
                return Err(crate::error::AppError::Validation(
                    "Invalid status filter".to_string(),
                )
                .sanitize("AUDIT-LOGS"))
            }
        },
    };

    let store_query = AuditQuery {
        user_id: query.user_id.clone(),
        action: query.action.clone(),
        status,
        start: query.start_date.map(|d| d.timestamp_millis()),
        end: query.end_date.map(|d| d.timestamp_millis()),
        limit: query.limit,
        offset: query.offset,
    };

    let result = state.db.query_audit(&store_query).await;

    // Exactly one trail entry for this privileged read, success or not.
    let outcome = if result.is_ok() {
        AuditStatus::Success
    } else {
        AuditStatus::Failed
    };
    let entry = NewAuditEntry::new("VIEW_AUDIT_LOGS", outcome)
        .actor(&admin.id, &admin.email)
        .metadata(serde_json::json!({
            "userId": query.user_id,
            "action": query.action,
            "status": query.status,
            "limit": query.limit,
            "offset": query.offset,
        }))
        .request_context(client_ip(&headers), user_agent(&headers));
    if let Err(e) = state.db.append_audit(&entry).await {
        return Err(e.sanitize("AUDIT-LOGS"));
    }

    let (logs, total) = result.map_err(|e| e.sanitize("AUDIT-LOGS"))?;
    let limit = store_query
        .limit
        .unwrap_or(crate::db::audit::DEFAULT_AUDIT_LIMIT)
        .clamp(1, crate::db::audit::MAX_AUDIT_LIMIT);
    Ok(Json(AuditLogsResponse {
        logs,
        total,
        limit,
        offset: store_query.offset.unwrap_or(0).max(0),
    }))
}

#[derive(Debug, Serialize)]
pub struct AuditStatsResponse {
    pub total: i64,
    pub recent: i64,
    #[serde(rename = "byStatus")]
    pub by_status: std::collections::BTreeMap<String, i64>,
    #[serde(rename = "topActions")]
    pub top_actions: Vec<crate::db::audit::ActionCount>,
}

/// API: aggregate audit counters. Admin-only; the read itself is audited.
pub async fn audit_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, PublicError> {
    let admin = match auth::require_admin(state.identity.as_ref(), &state.db, &headers).await {
        Ok(user) => user,
        Err(failure) => {
            audit_denied(&state, "VIEW_AUDIT_STATS", &failure, &headers).await;
            return Err(crate::error::AppError::Unauthorized.sanitize("AUDIT-STATS"));
        }
    };

    let result = state.db.audit_stats().await;

    let outcome = if result.is_ok() {
        AuditStatus::Success
    } else {
        AuditStatus::Failed
    };
    let entry = NewAuditEntry::new("VIEW_AUDIT_STATS", outcome)
        .actor(&admin.id, &admin.email)
        .request_context(client_ip(&headers), user_agent(&headers));
    if let Err(e) = state.db.append_audit(&entry).await {
        return Err(e.sanitize("AUDIT-STATS"));
    }

    let stats = result.map_err(|e| e.sanitize("AUDIT-STATS"))?;
    Ok(Json(AuditStatsResponse {
        total: stats.total,
        recent: stats.recent,
        by_status: stats.by_status,
        top_actions: stats.top_actions,
    }))
}

/// Liveness probe; bypasses the ingress filter.
pub async fn healthz() -> &'static str {
    "ok"
}

/// Fallback for unknown paths.
pub async fn not_found() -> impl IntoResponse {
    (
        axum::http::StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "not_found",
            "message": "Resource not found"
        })),
    )
}

pub(super) fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
