//! Public contact form
//!
//! The one unauthenticated write surface that accepts free text, which
//! makes it the favorite target for injection payloads. Every tracked
//! field runs through the pattern detector before the message is
//! accepted; a hit is recorded exactly like an ingress block.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{client_ip, AppState};
use crate::db::NewAttack;
use crate::detector;
use crate::geo;

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub status: &'static str,
    pub message: String,
}

/// API: accept a contact message after scanning each submitted field.
pub async fn submit_contact(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ContactRequest>,
) -> (StatusCode, Json<ContactResponse>) {
    let ip = client_ip(&headers).unwrap_or_else(|| "unknown".to_string());

    // Tracked form fields, scanned in submission order
    let fields = [req.name.as_str(), req.email.as_str(), req.message.as_str()];
    if let Some(threat) = detector::scan_all(fields) {
        tracing::warn!(
            ip = %ip,
            rule = threat.tag,
            severity = threat.severity,
            "blocked injection attempt in contact form"
        );
        match state
            .db
            .insert_attack(&NewAttack::new(&ip, threat.tag, threat.severity))
            .await
        {
            Ok(id) => {
                if let Ok(Some(record)) = state.db.get_attack(id).await {
                    state.event_bus.publish(record);
                }
                geo::spawn_enrich(state.geo.clone(), state.db.clone(), id, ip);
            }
            Err(e) => {
                tracing::warn!("Failed to store attack record: {}", e);
            }
        }
        return (
            StatusCode::FORBIDDEN,
            Json(ContactResponse {
                status: "error",
                message: "Request blocked".to_string(),
            }),
        );
    }

    if req.email.trim().is_empty() || !req.email.contains('@') {
        return (
            StatusCode::OK,
            Json(ContactResponse {
                status: "error",
                message: "A valid email is required".to_string(),
            }),
        );
    }
    if req.message.trim().is_empty() {
        return (
            StatusCode::OK,
            Json(ContactResponse {
                status: "error",
                message: "Message is required".to_string(),
            }),
        );
    }

    // Delivery is a collaborator concern; receipt is what we own here.
    tracing::info!(ip = %ip, from = %req.email, "contact message received");
    (
        StatusCode::OK,
        Json(ContactResponse {
            status: "success",
            message: "Message received".to_string(),
        }),
    )
}
