//! Ingress filter
//!
//! The single per-request pipeline: user-agent check, then pattern scan,
//! then the hosted WAF's verdict. Every block inserts an attack record
//! before the response leaves, so the dashboard is current the moment a
//! client sees a 403/429; geo enrichment is detached afterwards.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Request, StatusCode},
    response::Response,
};
use futures::future::BoxFuture;
use std::{
    net::SocketAddr,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use uuid::Uuid;

use super::AppState;
use crate::db::NewAttack;
use crate::detector;
use crate::geo;
use crate::waf::{RequestMeta, WafVerdict};

/// Internal endpoints that skip the pipeline entirely.
const EXCLUDED_PATHS: &[&str] = &["/healthz"];

/// Automation tool signatures rejected outright.
const BLOCKED_UA_SIGNATURES: &[&str] = &[
    "curl",
    "wget",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "libwww",
    "scrapy",
    "httpclient",
    "okhttp",
    "postman",
    "insomnia",
    "nikto",
    "sqlmap",
    "nmap",
    "masscan",
    "zgrab",
    "nessus",
    "dirbuster",
    "gobuster",
    "ffuf",
];

/// A plausible browser UA carries at least one of these.
const BROWSER_TOKENS: &[&str] = &[
    "mozilla", "chrome", "safari", "firefox", "edg", "opera", "msie", "trident",
];

/// Known good crawlers/preview bots; these bypass the UA stage only.
const ALLOWED_BOT_TOKENS: &[&str] = &[
    "googlebot",
    "bingbot",
    "duckduckbot",
    "yandexbot",
    "baiduspider",
    "slurp",
    "applebot",
    "facebookexternalhit",
    "twitterbot",
    "linkedinbot",
    "slackbot",
    "discordbot",
    "telegrambot",
    "whatsapp",
];

/// Get the real client IP address, checking proxy headers first
/// Priority: X-Real-IP > X-Forwarded-For (first IP) > ConnectInfo
fn get_real_ip(headers: &HeaderMap, fallback_ip: &str) -> String {
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(ips) = forwarded.to_str() {
            if let Some(first_ip) = ips.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    fallback_ip.to_string()
}

/// Decode percent-escapes ('+' included) so encoded payloads are scanned
/// in the form the application would see them. Invalid escapes pass
/// through literally; this must never reject an input.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hi = (bytes[i + 1] as char).to_digit(16);
                let lo = (bytes[i + 2] as char).to_digit(16);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi * 16 + lo) as u8);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

enum UserAgentCheck {
    /// Real-browser heuristic passed, or a known good crawler.
    Pass,
    Reject,
}

fn check_user_agent(user_agent: Option<&str>) -> UserAgentCheck {
    let Some(ua) = user_agent.map(str::trim).filter(|s| !s.is_empty()) else {
        return UserAgentCheck::Reject;
    };
    let ua = ua.to_lowercase();

    if ALLOWED_BOT_TOKENS.iter().any(|t| ua.contains(t)) {
        return UserAgentCheck::Pass;
    }
    if BLOCKED_UA_SIGNATURES.iter().any(|t| ua.contains(t)) {
        return UserAgentCheck::Reject;
    }
    if !BROWSER_TOKENS.iter().any(|t| ua.contains(t)) {
        return UserAgentCheck::Reject;
    }
    UserAgentCheck::Pass
}

/// Layer for the ingress filter
#[derive(Clone)]
pub struct IngressLayer {
    state: Arc<AppState>,
}

impl IngressLayer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for IngressLayer {
    type Service = IngressFilter<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IngressFilter {
            inner,
            state: self.state.clone(),
        }
    }
}

/// Middleware service running the filter pipeline
#[derive(Clone)]
pub struct IngressFilter<S> {
    inner: S,
    state: Arc<AppState>,
}

impl<S> Service<Request<Body>> for IngressFilter<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let state = self.state.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let path = request.uri().path().to_string();
            if EXCLUDED_PATHS.contains(&path.as_str()) {
                return inner.call(request).await;
            }

            let method = request.method().to_string();
            let query = request
                .uri()
                .query()
                .map(|q| format!("?{}", q))
                .unwrap_or_default();
            let full_uri = format!("{}{}", path, query);
            let headers = request.headers().clone();

            let fallback_ip = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let ip = get_real_ip(&headers, &fallback_ip);

            let user_agent = headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok());
            let referer = headers.get(header::REFERER).and_then(|v| v.to_str().ok());

            // Stage 1: does this look like a real browser (or a known crawler)?
            if let UserAgentCheck::Reject = check_user_agent(user_agent) {
                tracing::info!(ip = %ip, ua = ?user_agent, "blocked non-browser client");
                record_attack(&state, &ip, NewAttack::new(&ip, "BOT_DETECTED", 3)).await;
                return Ok(forbidden("bot_detected", "Automated clients are not allowed"));
            }

            // Stage 2: signature scan over the URL and request headers.
            // A confirmed injection signature blocks without consulting the WAF.
            let decoded_uri = percent_decode(&full_uri);
            let scan_targets = [
                decoded_uri.as_str(),
                user_agent.unwrap_or_default(),
                referer.unwrap_or_default(),
            ];
            if let Some(threat) = detector::scan_all(scan_targets) {
                tracing::warn!(
                    ip = %ip,
                    rule = threat.tag,
                    severity = threat.severity,
                    uri = %full_uri,
                    "blocked injection attempt"
                );
                record_attack(&state, &ip, NewAttack::new(&ip, threat.tag, threat.severity))
                    .await;
                return Ok(forbidden("malicious_request", "Request blocked"));
            }

            // Stage 3: the hosted WAF's verdict.
            let meta = RequestMeta {
                ip: ip.clone(),
                method,
                path: full_uri.clone(),
                user_agent: user_agent.map(|s| s.to_string()),
            };
            let verdict = match state.waf.evaluate(&meta).await {
                Ok(v) => v,
                Err(e) => {
                    if state.waf_fail_open {
                        tracing::warn!(error = %e, "WAF unavailable, failing open");
                        WafVerdict::Allow
                    } else {
                        tracing::error!(error = %e, "WAF unavailable, failing closed");
                        return Ok(forbidden("unavailable", "Request blocked"));
                    }
                }
            };

            match verdict {
                WafVerdict::Allow => inner.call(request).await,
                WafVerdict::RateLimited { retry_after_secs } => {
                    let (attack_type, severity) = verdict
                        .classification()
                        .unwrap_or(("RATE_LIMIT".to_string(), 6));
                    record_attack(&state, &ip, NewAttack::new(&ip, attack_type, severity)).await;
                    Ok(rate_limited(retry_after_secs))
                }
                WafVerdict::Denied { .. } => {
                    let (attack_type, severity) = verdict
                        .classification()
                        .unwrap_or(("WAF_DENIED".to_string(), 5));
                    tracing::info!(ip = %ip, attack_type = %attack_type, "WAF denied request");
                    record_attack(&state, &ip, NewAttack::new(&ip, attack_type, severity)).await;
                    Ok(forbidden("access_denied", "Request blocked"))
                }
            }
        })
    }
}

/// Insert the record (awaited, so the dashboard sees it before the client
/// sees the block), publish it live, then detach geo enrichment. A failed
/// insert is logged and the block still happens: deny never depends on
/// storage health.
async fn record_attack(state: &AppState, ip: &str, attack: NewAttack) {
    match state.db.insert_attack(&attack).await {
        Ok(id) => {
            if let Ok(Some(record)) = state.db.get_attack(id).await {
                state.event_bus.publish(record);
            }
            geo::spawn_enrich(state.geo.clone(), state.db.clone(), id, ip.to_string());
        }
        Err(e) => {
            tracing::warn!("Failed to store attack record: {}", e);
        }
    }
}

fn forbidden(error: &str, message: &str) -> Response {
    let body = serde_json::json!({ "error": error, "message": message }).to_string();
    Response::builder()
        .status(StatusCode::FORBIDDEN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_default()
}

fn rate_limited(retry_after_secs: u64) -> Response {
    let tracking_id = Uuid::new_v4();
    tracing::info!(%tracking_id, retry_after_secs, "rate limited request");
    let body = format!(
        "<!DOCTYPE html><html><head><title>429 Too Many Requests</title></head>\
         <body><h1>Too Many Requests</h1>\
         <p>You have sent too many requests. Try again in {retry_after_secs} seconds.</p>\
         <p>Tracking ID: {tracking_id}</p></body></html>"
    );
    Response::builder()
        .status(StatusCode::TOO_MANY_REQUESTS)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::RETRY_AFTER, retry_after_secs.to_string())
        .body(Body::from(body))
        .unwrap_or_default()
}
