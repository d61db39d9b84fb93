//! Ingress filter pipeline tests against the assembled router.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tower::ServiceExt; // for .oneshot()

use twin_sentry::auth::{IdentityProvider, SessionClaims};
use twin_sentry::config::GeoConfig;
use twin_sentry::db::Database;
use twin_sentry::events::EventBus;
use twin_sentry::geo::GeoClient;
use twin_sentry::waf::{RequestMeta, WafEngine, WafError, WafVerdict};
use twin_sentry::web::{build_router, AppState};

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

struct NoIdentity;

#[async_trait]
impl IdentityProvider for NoIdentity {
    async fn verify(&self, _token: &str) -> Option<SessionClaims> {
        None
    }
}

/// Scripted WAF: returns a fixed outcome and remembers being called.
struct ScriptedWaf {
    outcome: Result<WafVerdict, ()>,
    called: AtomicBool,
}

impl ScriptedWaf {
    fn allow() -> Self {
        Self {
            outcome: Ok(WafVerdict::Allow),
            called: AtomicBool::new(false),
        }
    }

    fn verdict(v: WafVerdict) -> Self {
        Self {
            outcome: Ok(v),
            called: AtomicBool::new(false),
        }
    }

    fn unavailable() -> Self {
        Self {
            outcome: Err(()),
            called: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl WafEngine for ScriptedWaf {
    async fn evaluate(&self, _meta: &RequestMeta) -> Result<WafVerdict, WafError> {
        self.called.store(true, Ordering::SeqCst);
        match &self.outcome {
            Ok(v) => Ok(v.clone()),
            Err(()) => Err(WafError::Transport("decision endpoint down".to_string())),
        }
    }
}

/// Limiter with a fixed capacity: requests beyond it are rate limited.
struct CountingLimiter {
    capacity: u32,
    retry_after_secs: u64,
    seen: AtomicU32,
}

#[async_trait]
impl WafEngine for CountingLimiter {
    async fn evaluate(&self, _meta: &RequestMeta) -> Result<WafVerdict, WafError> {
        let n = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        if n > self.capacity {
            Ok(WafVerdict::RateLimited {
                retry_after_secs: self.retry_after_secs,
            })
        } else {
            Ok(WafVerdict::Allow)
        }
    }
}

fn disabled_geo() -> GeoClient {
    GeoClient::new(&GeoConfig {
        endpoint: String::new(),
        timeout_secs: 1,
        enabled: false,
    })
}

async fn app_with(waf: Arc<dyn WafEngine>, fail_open: bool) -> (Router, Database) {
    let db = Database::in_memory().await.unwrap();
    let (tx, _) = tokio::sync::broadcast::channel(64);
    let state = Arc::new(AppState {
        db: db.clone(),
        geo: disabled_geo(),
        waf,
        waf_fail_open: fail_open,
        identity: Arc::new(NoIdentity),
        event_bus: EventBus::new(tx),
    });
    (build_router(state), db)
}

fn get(uri: &str, ua: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri).method("GET");
    if let Some(ua) = ua {
        builder = builder.header("user-agent", ua);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn automation_user_agent_is_blocked_without_consulting_the_waf() {
    let waf = Arc::new(ScriptedWaf::allow());
    let (app, db) = app_with(waf.clone(), true).await;

    let response = app
        .oneshot(get("/api/threat-activity", Some("curl/7.68.0")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!waf.called.load(Ordering::SeqCst), "WAF must not be consulted");

    let records = db.recent_attacks(24, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attack_type, "BOT_DETECTED");
    assert_eq!(records[0].severity, 3);
}

#[tokio::test]
async fn missing_user_agent_is_blocked() {
    let (app, _db) = app_with(Arc::new(ScriptedWaf::allow()), true).await;
    let response = app.oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn injection_signature_blocks_before_the_waf() {
    let waf = Arc::new(ScriptedWaf::allow());
    let (app, db) = app_with(waf.clone(), true).await;

    let uri = "/search?q=%27%3B%20DROP%20TABLE%20users%3B--";
    let response = app.oneshot(get(uri, Some(BROWSER_UA))).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!waf.called.load(Ordering::SeqCst), "WAF must not be consulted");

    let records = db.recent_attacks(24, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].attack_type.starts_with("SQL_INJECTION:"));
    assert!(records[0].severity >= 8);
    // Geo enrichment has not run; the record is visible regardless.
    assert!(records[0].latitude.is_none());
    assert!(records[0].longitude.is_none());
}

#[tokio::test]
async fn good_crawlers_bypass_the_ua_stage_but_not_the_scan() {
    let (app, db) = app_with(Arc::new(ScriptedWaf::allow()), true).await;

    let googlebot = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
    let ok = app
        .clone()
        .oneshot(get("/api/threat-activity", Some(googlebot)))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let blocked = app
        .oneshot(get("/search?q=1%20union%20select%20password", Some(googlebot)))
        .await
        .unwrap();
    assert_eq!(blocked.status(), StatusCode::FORBIDDEN);

    let records = db.recent_attacks(24, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attack_type, "SQL_INJECTION:UNION_SELECT");
}

#[tokio::test]
async fn rate_limit_verdicts_get_429_with_retry_after_and_one_record_each() {
    let limiter = Arc::new(CountingLimiter {
        capacity: 5,
        retry_after_secs: 7,
        seen: AtomicU32::new(0),
    });
    let (app, db) = app_with(limiter, true).await;

    let mut limited = 0;
    for _ in 0..8 {
        let response = app
            .clone()
            .oneshot(get("/api/threat-activity", Some(BROWSER_UA)))
            .await
            .unwrap();
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
            assert_eq!(
                response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok()),
                Some("7")
            );
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let html = String::from_utf8(bytes.to_vec()).unwrap();
            assert!(html.contains("Tracking ID"));
        }
    }
    assert_eq!(limited, 3);

    let records = db.recent_attacks(24, 100).await.unwrap();
    let rate_limited: Vec<_> = records
        .iter()
        .filter(|r| r.attack_type == "RATE_LIMIT")
        .collect();
    assert_eq!(rate_limited.len(), 3);
    assert!(rate_limited.iter().all(|r| r.severity == 6));
}

#[tokio::test]
async fn waf_denials_are_classified_and_recorded() {
    let shield = WafVerdict::Denied {
        category: twin_sentry::waf::DenyCategory::Shield,
        subtype: Some("xss".to_string()),
    };
    let (app, db) = app_with(Arc::new(ScriptedWaf::verdict(shield)), true).await;

    let response = app
        .oneshot(get("/api/threat-activity", Some(BROWSER_UA)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert!(body.get("error").is_some());
    assert!(body.get("message").is_some());

    let records = db.recent_attacks(24, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attack_type, "SHIELD:XSS");
    assert_eq!(records[0].severity, 8);
}

#[tokio::test]
async fn waf_outage_fails_open_by_default_policy() {
    let (app, db) = app_with(Arc::new(ScriptedWaf::unavailable()), true).await;

    let response = app
        .oneshot(get("/api/threat-activity", Some(BROWSER_UA)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(db.recent_attacks(24, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn waf_outage_fails_closed_when_configured_without_recording_an_attack() {
    let (app, db) = app_with(Arc::new(ScriptedWaf::unavailable()), false).await;

    let response = app
        .oneshot(get("/api/threat-activity", Some(BROWSER_UA)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    // An outage is not an attack.
    assert!(db.recent_attacks(24, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn healthz_bypasses_the_pipeline() {
    let (app, _db) = app_with(Arc::new(ScriptedWaf::unavailable()), false).await;
    let response = app.oneshot(get("/healthz", Some("curl/7.68.0"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn blocked_attack_is_immediately_visible_through_the_read_api() {
    let (app, _db) = app_with(Arc::new(ScriptedWaf::allow()), true).await;

    let blocked = app
        .clone()
        .oneshot(get("/?q=%27%20OR%20%271%27%3D%271", Some(BROWSER_UA)))
        .await
        .unwrap();
    assert_eq!(blocked.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(get("/api/attack-logs?hours=24&limit=10", Some(BROWSER_UA)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("no-store")
    );
    let body = body_json(response).await;
    let logs = body.as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["type"], "SQL_INJECTION:AUTH_BYPASS");
    assert_eq!(logs[0]["severity"], 10);
    assert!(logs[0]["latitude"].is_null());
}
