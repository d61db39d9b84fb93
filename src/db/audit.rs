//! Audit log store
//!
//! Append-only trail of privileged operation attempts. Unlike the attack
//! stream, appends here are mandatory: a failed append propagates to the
//! caller because a privileged mutation without a trail is a compliance
//! violation, not an inconvenience.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::QueryBuilder;
use std::collections::BTreeMap;
use std::fmt;

use super::Database;
use crate::error::AppError;

/// Default page size for audit queries; `limit` is clamped to [1, 200].
pub const DEFAULT_AUDIT_LIMIT: i64 = 50;
pub const MAX_AUDIT_LIMIT: i64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failed,
    Denied,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failed => "failed",
            AuditStatus::Denied => "denied",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(AuditStatus::Success),
            "failed" => Some(AuditStatus::Failed),
            "denied" => Some(AuditStatus::Denied),
            _ => None,
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub user_id: String,
    pub user_email: String,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub status: String,
    pub metadata: JsonValue,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One privileged attempt, captured at the action site. Actor identity is
/// copied in, never referenced live.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub user_id: String,
    pub user_email: String,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub status: AuditStatus,
    pub metadata: JsonValue,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewAuditEntry {
    pub fn new(action: impl Into<String>, status: AuditStatus) -> Self {
        Self {
            user_id: "unknown".to_string(),
            user_email: "unknown".to_string(),
            action: action.into(),
            resource_type: None,
            resource_id: None,
            status,
            metadata: JsonValue::Null,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn actor(mut self, user_id: impl Into<String>, user_email: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self.user_email = user_email.into();
        self
    }

    pub fn resource(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.resource_type = Some(kind.into());
        self.resource_id = Some(id.into());
        self
    }

    pub fn metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn request_context(
        mut self,
        ip: Option<impl Into<String>>,
        user_agent: Option<impl Into<String>>,
    ) -> Self {
        self.ip_address = ip.map(Into::into);
        self.user_agent = user_agent.map(Into::into);
        self
    }
}

/// Conjunctive filter set for audit queries; every field is optional.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub status: Option<AuditStatus>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditStats {
    pub total: i64,
    pub recent: i64,
    pub by_status: BTreeMap<String, i64>,
    pub top_actions: Vec<ActionCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionCount {
    pub action: String,
    pub count: i64,
}

type AuditRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
);

fn row_to_entry(row: AuditRow) -> AuditLogEntry {
    let (
        id,
        user_id,
        user_email,
        action,
        resource_type,
        resource_id,
        status,
        metadata,
        ip_address,
        user_agent,
        created_at,
    ) = row;
    AuditLogEntry {
        id,
        user_id,
        user_email,
        action,
        resource_type,
        resource_id,
        status,
        metadata: metadata
            .as_deref()
            .and_then(|m| serde_json::from_str(m).ok())
            .unwrap_or(JsonValue::Null),
        ip_address,
        user_agent,
        created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
    }
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, sqlx::Sqlite>, query: &'a AuditQuery) {
    builder.push(" WHERE 1=1");
    if let Some(user_id) = &query.user_id {
        builder.push(" AND user_id = ").push_bind(user_id.as_str());
    }
    if let Some(action) = &query.action {
        builder.push(" AND action = ").push_bind(action.as_str());
    }
    if let Some(status) = &query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(start) = query.start {
        builder.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = query.end {
        builder.push(" AND created_at <= ").push_bind(end);
    }
}

impl Database {
    /// Append one audit entry. Called synchronously on every privileged
    /// attempt; errors propagate.
    pub async fn append_audit(&self, entry: &NewAuditEntry) -> Result<(), AppError> {
        let metadata = if entry.metadata.is_null() {
            None
        } else {
            Some(entry.metadata.to_string())
        };
        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (user_id, user_email, action, resource_type, resource_id,
                 status, metadata, ip_address, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.user_id)
        .bind(&entry.user_email)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(entry.status.as_str())
        .bind(metadata)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(Utc::now().timestamp_millis())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Filtered page of audit entries, newest first, plus the total count
    /// matching the same filters.
    pub async fn query_audit(
        &self,
        query: &AuditQuery,
    ) -> Result<(Vec<AuditLogEntry>, i64), AppError> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_AUDIT_LIMIT)
            .clamp(1, MAX_AUDIT_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);

        let mut count_builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM audit_logs");
        push_filters(&mut count_builder, query);
        let total: (i64,) = count_builder.build_query_as().fetch_one(self.pool()).await?;

        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT id, user_id, user_email, action, resource_type, resource_id, \
             status, metadata, ip_address, user_agent, created_at FROM audit_logs",
        );
        push_filters(&mut builder, query);
        builder.push(" ORDER BY id DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let rows: Vec<AuditRow> = builder.build_query_as().fetch_all(self.pool()).await?;

        Ok((rows.into_iter().map(row_to_entry).collect(), total.0))
    }

    /// Aggregate counters for the audit dashboard card.
    pub async fn audit_stats(&self) -> Result<AuditStats, AppError> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_logs")
            .fetch_one(self.pool())
            .await?;

        let since = Utc::now().timestamp_millis() - 24 * 3600 * 1000;
        let recent: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM audit_logs WHERE created_at > ?")
                .bind(since)
                .fetch_one(self.pool())
                .await?;

        let status_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM audit_logs GROUP BY status",
        )
        .fetch_all(self.pool())
        .await?;
        let mut by_status: BTreeMap<String, i64> = BTreeMap::new();
        for status in ["success", "failed", "denied"] {
            by_status.insert(status.to_string(), 0);
        }
        for (status, count) in status_rows {
            by_status.insert(status, count);
        }

        let action_rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT action, COUNT(*) as count FROM audit_logs
            GROUP BY action ORDER BY count DESC LIMIT 10
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        Ok(AuditStats {
            total: total.0,
            recent: recent.0,
            by_status,
            top_actions: action_rows
                .into_iter()
                .map(|(action, count)| ActionCount { action, count })
                .collect(),
        })
    }
}
