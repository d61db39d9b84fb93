//! Client-side deterrence event logger
//!
//! The deterrence layer in the browser reports attempts to open devtools,
//! copy content, and similar. Logging is strictly best-effort: this
//! endpoint never returns anything the UI would have to treat as fatal,
//! and it never waits on geo enrichment - appends here must be
//! near-instant.

use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{client_ip, AppState};
use crate::db::NewAttack;

/// Fixed severity table keyed by the client event type.
const CLIENT_EVENT_SEVERITIES: &[(&str, u8)] = &[
    ("DEVTOOLS_DETECTED", 5),
    ("VIEW_SOURCE", 5),
    ("SAVE_PAGE", 5),
    ("COPY_ATTEMPT", 4),
    ("KEYBOARD_SHORTCUT", 4),
    ("RIGHT_CLICK", 3),
];

pub fn severity_for(event_type: &str) -> Option<u8> {
    CLIENT_EVENT_SEVERITIES
        .iter()
        .find(|(t, _)| *t == event_type)
        .map(|(_, s)| *s)
}

#[derive(Debug, Deserialize)]
pub struct ClientEventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ClientEventResponse {
    pub success: bool,
}

/// API: record one client deterrence event. Always HTTP 200.
pub async fn log_client_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ClientEventRequest>,
) -> Json<ClientEventResponse> {
    let Some(severity) = severity_for(&req.event_type) else {
        tracing::debug!(event_type = %req.event_type, "dropping unknown client event");
        return Json(ClientEventResponse { success: false });
    };

    let ip = client_ip(&headers).unwrap_or_else(|| "unknown".to_string());
    let attack = NewAttack::new(&ip, format!("CLIENT:{}", req.event_type), severity);

    match state.db.insert_attack(&attack).await {
        Ok(id) => {
            if let Ok(Some(record)) = state.db.get_attack(id).await {
                state.event_bus.publish(record);
            }
            tracing::info!(ip = %ip, event_type = %req.event_type, "client event recorded");
            Json(ClientEventResponse { success: true })
        }
        Err(e) => {
            // The caller's UI keeps working regardless.
            tracing::warn!("Failed to store client event: {}", e);
            Json(ClientEventResponse { success: false })
        }
    }
}
