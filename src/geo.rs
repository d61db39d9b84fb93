//! Geo enrichment client
//!
//! Best-effort resolution of an attacker IP to city/country/coordinates
//! through an external lookup service. Lookups run detached from the
//! request path: the record is already visible to the dashboard before
//! enrichment starts, and every failure here is swallowed.

use cached::proc_macro::cached;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::GeoConfig;
use crate::db::Database;

/// Resolved geo fields. Coordinates stay decimal strings end to end; the
/// map consumer parses them, we never do arithmetic on them.
#[derive(Debug, Clone)]
pub struct GeoInfo {
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

/// ip-api style lookup response.
#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    status: String,
    city: Option<String>,
    country: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Clone)]
pub struct GeoClient {
    http: reqwest::Client,
    endpoint: String,
    enabled: bool,
}

impl GeoClient {
    pub fn new(config: &GeoConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        if config.enabled {
            info!("Geo enrichment enabled ({})", config.endpoint);
        } else {
            info!("Geo enrichment disabled");
        }
        Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            enabled: config.enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Resolve one IP. Returns None for private/loopback addresses, for
    /// anything unparseable, and for every transport or decode failure.
    pub async fn lookup(&self, ip: &str) -> Option<GeoInfo> {
        if !self.enabled {
            return None;
        }
        let ip_addr: IpAddr = ip.parse().ok()?;
        if is_private_ip(&ip_addr) {
            return None;
        }
        cached_lookup(self.clone(), ip.to_string()).await
    }

    async fn fetch(&self, ip: &str) -> Option<GeoInfo> {
        let url = format!("{}/{}", self.endpoint, ip);
        let response = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("Geo lookup failed for {}: {}", ip, e);
                return None;
            }
        };
        if !response.status().is_success() {
            debug!("Geo lookup for {} returned {}", ip, response.status());
            return None;
        }
        let body: LookupResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                debug!("Geo lookup for {} returned malformed body: {}", ip, e);
                return None;
            }
        };
        if body.status != "success" {
            debug!("Geo lookup for {} unresolved (status={})", ip, body.status);
            return None;
        }
        Some(GeoInfo {
            city: body.city,
            country: body.country,
            latitude: body.lat.map(|v| v.to_string()),
            longitude: body.lon.map(|v| v.to_string()),
        })
    }
}

/// Per-IP memoization: repeat offenders would otherwise hammer the lookup
/// service. Only successful resolutions are cached, for one hour.
#[cached(
    time = 3600,
    option = true,
    key = "String",
    convert = r#"{ ip.clone() }"#
)]
async fn cached_lookup(client: GeoClient, ip: String) -> Option<GeoInfo> {
    client.fetch(&ip).await
}

/// Detach an enrichment task for a freshly inserted attack record. The
/// caller's response latency is independent of this task; its failures
/// are logged at debug and dropped.
pub fn spawn_enrich(client: GeoClient, db: Database, record_id: i64, ip: String) {
    if !client.is_enabled() {
        return;
    }
    tokio::spawn(async move {
        let Some(geo) = client.lookup(&ip).await else {
            return;
        };
        if let Err(e) = db.update_attack_geo(record_id, &geo).await {
            debug!("Geo update for record {} failed: {}", record_id, e);
        }
    });
}

/// Check if an IP address is private/local
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private()
                || ipv4.is_loopback()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_documentation()
                || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => ipv6.is_loopback() || ipv6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeoConfig;

    fn client(endpoint: &str, enabled: bool) -> GeoClient {
        GeoClient::new(&GeoConfig {
            endpoint: endpoint.to_string(),
            timeout_secs: 1,
            enabled,
        })
    }

    #[tokio::test]
    async fn private_and_loopback_ips_are_skipped() {
        let c = client("http://127.0.0.1:1", true);
        assert!(c.lookup("192.168.1.10").await.is_none());
        assert!(c.lookup("10.0.0.1").await.is_none());
        assert!(c.lookup("127.0.0.1").await.is_none());
        assert!(c.lookup("::1").await.is_none());
    }

    #[tokio::test]
    async fn garbage_ips_are_skipped() {
        let c = client("http://127.0.0.1:1", true);
        assert!(c.lookup("unknown").await.is_none());
        assert!(c.lookup("").await.is_none());
        assert!(c.lookup("999.1.2.3").await.is_none());
    }

    #[tokio::test]
    async fn disabled_client_never_looks_up() {
        let c = client("", false);
        assert!(c.lookup("8.8.8.8").await.is_none());
    }

    #[tokio::test]
    async fn unreachable_service_fails_silently() {
        // Nothing listens on this port; the failure surfaces as None.
        let c = client("http://127.0.0.1:9", true);
        assert!(c.lookup("203.0.114.7").await.is_none());
    }
}
