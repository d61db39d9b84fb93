//! Web server module

pub mod actions;
pub mod client_events;
pub mod contact;
pub mod ingress;
pub mod routes;
mod sse;

use anyhow::Result;
use axum::http::{HeaderMap, Method};
use axum::{
    routing::{get, post, put},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::auth::IdentityProvider;
use crate::config::Config;
use crate::db::{AuditStatus, Database, NewAuditEntry};
use crate::events::EventBus;
use crate::geo::GeoClient;
use crate::waf::WafEngine;

pub struct AppState {
    pub db: Database,
    pub geo: GeoClient,
    pub waf: Arc<dyn WafEngine>,
    pub waf_fail_open: bool,
    pub identity: Arc<dyn IdentityProvider>,
    pub event_bus: EventBus,
}

/// Client IP from proxy headers only; None when the request carries no
/// usable address (callers decide between "unknown" and omission).
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(ips) = forwarded.to_str() {
            if let Some(first_ip) = ips.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }
    }
    None
}

/// Append the denied entry for a refused privileged call. A failure to
/// write the trail is logged loudly but cannot un-deny the request.
pub(crate) async fn audit_denied(
    state: &AppState,
    action: &str,
    failure: &crate::auth::AuthFailure,
    headers: &HeaderMap,
) {
    let mut entry = NewAuditEntry::new(action, AuditStatus::Denied)
        .metadata(serde_json::json!({ "reason": "not authorized" }))
        .request_context(client_ip(headers), routes::user_agent(headers));
    if let Some(claims) = failure.claims() {
        entry = entry.actor(&claims.user_id, &claims.email);
    }
    if let Err(e) = state.db.append_audit(&entry).await {
        tracing::error!("Failed to write denied audit entry for {}: {}", action, e);
    }
}

/// Assemble the full application: ingress filter in front, read API,
/// admin actions, client event sink, live stream.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        // Dashboard read API
        .route("/api/attack-logs", get(routes::attack_logs))
        .route("/api/hourly-stats", get(routes::hourly_stats))
        .route("/api/threat-activity", get(routes::threat_activity))
        .route("/api/audit-logs", get(routes::audit_logs))
        .route("/api/audit-stats", get(routes::audit_stats))
        // Live attack stream
        .route("/api/live", get(sse::live_attacks))
        // Client deterrence telemetry
        .route("/api/client-events", post(client_events::log_client_event))
        // Public contact form (tracked fields are pattern-scanned)
        .route("/api/contact", post(contact::submit_contact))
        // Privileged admin actions
        .route("/api/admin/users/role", post(actions::update_user_role))
        .route("/api/admin/projects", post(actions::create_project))
        .route(
            "/api/admin/projects/:id",
            put(actions::update_project).delete(actions::delete_project),
        )
        // Liveness (excluded from the ingress pipeline)
        .route("/healthz", get(routes::healthz))
        // Unknown paths still go through the ingress filter
        .fallback(routes::not_found)
        .layer(ingress::IngressLayer::new(state.clone()))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(config: &Config, state: Arc<AppState>) -> Result<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.http_port);
    info!("Web server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
