//! Privileged admin actions
//!
//! Every handler here follows the same discipline: validate the input,
//! revalidate the caller's admin role, perform the mutation, and append
//! exactly one audit entry for whichever branch was taken. Responses are
//! always a structured `{status, message}` so the UI renders them without
//! special-casing; no storage detail ever reaches the message.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::{audit_denied, client_ip, routes::user_agent, AppState};
use crate::auth;
use crate::db::{AuditStatus, NewAuditEntry, User};
use crate::error::AppError;

pub const ROLES: &[&str] = &["admin", "user"];

#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    pub status: &'static str,
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self {
                status: "success",
                message: message.into(),
            }),
        )
    }

    fn error(message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self {
                status: "error",
                message: message.into(),
            }),
        )
    }

    fn unauthorized() -> (StatusCode, Json<Self>) {
        (
            StatusCode::FORBIDDEN,
            Json(Self {
                status: "error",
                message: "Not authorized".to_string(),
            }),
        )
    }
}

type ActionResult = (StatusCode, Json<ActionResponse>);

/// Shared guard step: on failure the denied audit entry is written here
/// and the caller just returns the response.
async fn guard(
    state: &AppState,
    action: &str,
    headers: &HeaderMap,
) -> Result<User, ActionResult> {
    match auth::require_admin(state.identity.as_ref(), &state.db, headers).await {
        Ok(user) => Ok(user),
        Err(failure) => {
            audit_denied(state, action, &failure, headers).await;
            Err(ActionResponse::unauthorized())
        }
    }
}

fn entry_for(
    admin: &User,
    action: &str,
    status: AuditStatus,
    headers: &HeaderMap,
) -> NewAuditEntry {
    NewAuditEntry::new(action, status)
        .actor(&admin.id, &admin.email)
        .request_context(client_ip(headers), user_agent(headers))
}

/// Append the branch's single audit entry. An append failure downgrades
/// the whole action to an error response: a privileged mutation without
/// a trail must not report success.
async fn append_audit(state: &AppState, entry: NewAuditEntry) -> Result<(), ActionResult> {
    state.db.append_audit(&entry).await.map_err(|e| {
        let public = e.sanitize("AUDIT-APPEND");
        ActionResponse::error(public.message)
    })
}

// === USER_ROLE_UPDATE ===

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub email: String,
    pub role: String,
}

pub async fn update_user_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<UpdateRoleRequest>,
) -> ActionResult {
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return ActionResponse::error("A valid email is required");
    }
    if !ROLES.contains(&req.role.as_str()) {
        return ActionResponse::error("Invalid role");
    }

    let admin = match guard(&state, "USER_ROLE_UPDATE", &headers).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state.db.update_user_role(email, &req.role).await {
        Ok(Some(old_role)) => {
            let entry = entry_for(&admin, "USER_ROLE_UPDATE", AuditStatus::Success, &headers)
                .resource("user", email)
                .metadata(json!({
                    "email": email,
                    "oldRole": old_role,
                    "newRole": req.role,
                }));
            if let Err(resp) = append_audit(&state, entry).await {
                return resp;
            }
            ActionResponse::success("Role updated")
        }
        Ok(None) => {
            let entry = entry_for(&admin, "USER_ROLE_UPDATE", AuditStatus::Failed, &headers)
                .resource("user", email)
                .metadata(json!({ "reason": "User not found", "email": email }));
            if let Err(resp) = append_audit(&state, entry).await {
                return resp;
            }
            ActionResponse::error("User not found")
        }
        Err(e) => {
            let public = e.sanitize("USER-ROLE-UPDATE");
            let entry = entry_for(&admin, "USER_ROLE_UPDATE", AuditStatus::Failed, &headers)
                .resource("user", email)
                .metadata(json!({ "reason": "storage failure", "code": public.code }));
            let _ = append_audit(&state, entry).await;
            ActionResponse::error(public.message)
        }
    }
}

// === PROJECT_CREATE / PROJECT_UPDATE / PROJECT_DELETE ===

#[derive(Debug, Deserialize)]
pub struct ProjectRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub featured: bool,
}

fn validate_project(req: &ProjectRequest) -> Result<(), AppError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if title.len() > 200 {
        return Err(AppError::Validation(
            "Title must be at most 200 characters".to_string(),
        ));
    }
    if req.description.trim().is_empty() {
        return Err(AppError::Validation("Description is required".to_string()));
    }
    Ok(())
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ProjectRequest>,
) -> ActionResult {
    if let Err(e) = validate_project(&req) {
        return ActionResponse::error(e.sanitize("PROJECT-CREATE").message);
    }

    let admin = match guard(&state, "PROJECT_CREATE", &headers).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state
        .db
        .insert_project(
            req.title.trim(),
            req.description.trim(),
            req.url.as_deref(),
            req.featured,
        )
        .await
    {
        Ok(id) => {
            let entry = entry_for(&admin, "PROJECT_CREATE", AuditStatus::Success, &headers)
                .resource("project", id.to_string())
                .metadata(json!({ "title": req.title.trim(), "featured": req.featured }));
            if let Err(resp) = append_audit(&state, entry).await {
                return resp;
            }
            ActionResponse::success("Project created")
        }
        Err(e) => {
            let public = e.sanitize("PROJECT-CREATE");
            let entry = entry_for(&admin, "PROJECT_CREATE", AuditStatus::Failed, &headers)
                .metadata(json!({ "reason": "storage failure", "code": public.code }));
            let _ = append_audit(&state, entry).await;
            ActionResponse::error(public.message)
        }
    }
}

pub async fn update_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<ProjectRequest>,
) -> ActionResult {
    if let Err(e) = validate_project(&req) {
        return ActionResponse::error(e.sanitize("PROJECT-UPDATE").message);
    }

    let admin = match guard(&state, "PROJECT_UPDATE", &headers).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state
        .db
        .update_project(
            id,
            req.title.trim(),
            req.description.trim(),
            req.url.as_deref(),
            req.featured,
        )
        .await
    {
        Ok(true) => {
            let entry = entry_for(&admin, "PROJECT_UPDATE", AuditStatus::Success, &headers)
                .resource("project", id.to_string())
                .metadata(json!({ "title": req.title.trim(), "featured": req.featured }));
            if let Err(resp) = append_audit(&state, entry).await {
                return resp;
            }
            ActionResponse::success("Project updated")
        }
        Ok(false) => {
            let entry = entry_for(&admin, "PROJECT_UPDATE", AuditStatus::Failed, &headers)
                .resource("project", id.to_string())
                .metadata(json!({ "reason": "Project not found" }));
            if let Err(resp) = append_audit(&state, entry).await {
                return resp;
            }
            ActionResponse::error("Project not found")
        }
        Err(e) => {
            let public = e.sanitize("PROJECT-UPDATE");
            let entry = entry_for(&admin, "PROJECT_UPDATE", AuditStatus::Failed, &headers)
                .resource("project", id.to_string())
                .metadata(json!({ "reason": "storage failure", "code": public.code }));
            let _ = append_audit(&state, entry).await;
            ActionResponse::error(public.message)
        }
    }
}

pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ActionResult {
    let admin = match guard(&state, "PROJECT_DELETE", &headers).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match state.db.delete_project(id).await {
        Ok(true) => {
            let entry = entry_for(&admin, "PROJECT_DELETE", AuditStatus::Success, &headers)
                .resource("project", id.to_string());
            if let Err(resp) = append_audit(&state, entry).await {
                return resp;
            }
            ActionResponse::success("Project deleted")
        }
        Ok(false) => {
            let entry = entry_for(&admin, "PROJECT_DELETE", AuditStatus::Failed, &headers)
                .resource("project", id.to_string())
                .metadata(json!({ "reason": "Project not found" }));
            if let Err(resp) = append_audit(&state, entry).await {
                return resp;
            }
            ActionResponse::error("Project not found")
        }
        Err(e) => {
            let public = e.sanitize("PROJECT-DELETE");
            let entry = entry_for(&admin, "PROJECT_DELETE", AuditStatus::Failed, &headers)
                .resource("project", id.to_string())
                .metadata(json!({ "reason": "storage failure", "code": public.code }));
            let _ = append_audit(&state, entry).await;
            ActionResponse::error(public.message)
        }
    }
}
