//! WAF collaborator boundary
//!
//! The hosted WAF owns bot/rate-limit/shield decisioning; this module
//! owns the contract. Verdicts are a typed enum, not a reason string to
//! sniff, and the outage policy (fail open vs fail closed) is operator
//! configuration, not a hardcoded guess.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::WafConfig;

/// Request facts forwarded to the decision engine.
#[derive(Debug, Clone, Serialize)]
pub struct RequestMeta {
    pub ip: String,
    pub method: String,
    pub path: String,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyCategory {
    Bot,
    Shield,
    Other,
}

/// Structured verdict from the decision engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum WafVerdict {
    Allow,
    RateLimited {
        #[serde(default = "default_retry_after")]
        retry_after_secs: u64,
    },
    Denied {
        category: DenyCategory,
        #[serde(default)]
        subtype: Option<String>,
    },
}

fn default_retry_after() -> u64 {
    60
}

impl WafVerdict {
    /// Attack type tag and severity recorded for a blocking verdict.
    /// Allow has no classification.
    pub fn classification(&self) -> Option<(String, u8)> {
        match self {
            WafVerdict::Allow => None,
            WafVerdict::RateLimited { .. } => Some(("RATE_LIMIT".to_string(), 6)),
            WafVerdict::Denied { category, subtype } => Some(match category {
                DenyCategory::Bot => ("BOT_DETECTED".to_string(), 3),
                DenyCategory::Shield => {
                    let subtype = subtype
                        .as_deref()
                        .filter(|s| !s.is_empty())
                        .unwrap_or("GENERIC");
                    (format!("SHIELD:{}", subtype.to_uppercase()), 8)
                }
                DenyCategory::Other => ("WAF_DENIED".to_string(), 5),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum WafError {
    #[error("decision request failed: {0}")]
    Transport(String),
    #[error("decision response malformed: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait WafEngine: Send + Sync {
    async fn evaluate(&self, meta: &RequestMeta) -> Result<WafVerdict, WafError>;
}

/// Remote decision engine. Disabled (no URL configured) it allows
/// everything, which keeps local development and tests self-contained.
pub struct RemoteWafEngine {
    http: reqwest::Client,
    decision_url: String,
}

impl RemoteWafEngine {
    pub fn new(config: &WafConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        if config.decision_url.is_empty() {
            info!("WAF decision engine disabled (no decision_url)");
        } else {
            info!("WAF decision engine at {}", config.decision_url);
        }
        Self {
            http,
            decision_url: config.decision_url.clone(),
        }
    }
}

#[async_trait]
impl WafEngine for RemoteWafEngine {
    async fn evaluate(&self, meta: &RequestMeta) -> Result<WafVerdict, WafError> {
        if self.decision_url.is_empty() {
            return Ok(WafVerdict::Allow);
        }
        let response = self
            .http
            .post(&self.decision_url)
            .json(meta)
            .send()
            .await
            .map_err(|e| WafError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(WafError::Transport(format!(
                "decision endpoint returned {}",
                response.status()
            )));
        }
        response
            .json::<WafVerdict>()
            .await
            .map_err(|e| WafError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_classifies_as_severity_6() {
        let verdict = WafVerdict::RateLimited { retry_after_secs: 30 };
        assert_eq!(verdict.classification(), Some(("RATE_LIMIT".to_string(), 6)));
    }

    #[test]
    fn bot_and_shield_and_generic_severities() {
        let bot = WafVerdict::Denied {
            category: DenyCategory::Bot,
            subtype: None,
        };
        assert_eq!(bot.classification(), Some(("BOT_DETECTED".to_string(), 3)));

        let shield = WafVerdict::Denied {
            category: DenyCategory::Shield,
            subtype: Some("xss".to_string()),
        };
        assert_eq!(shield.classification(), Some(("SHIELD:XSS".to_string(), 8)));

        let shield_untagged = WafVerdict::Denied {
            category: DenyCategory::Shield,
            subtype: None,
        };
        assert_eq!(
            shield_untagged.classification(),
            Some(("SHIELD:GENERIC".to_string(), 8))
        );

        let other = WafVerdict::Denied {
            category: DenyCategory::Other,
            subtype: None,
        };
        assert_eq!(other.classification(), Some(("WAF_DENIED".to_string(), 5)));
    }

    #[test]
    fn allow_has_no_classification() {
        assert_eq!(WafVerdict::Allow.classification(), None);
    }

    #[test]
    fn verdicts_deserialize_from_structured_json() {
        let v: WafVerdict = serde_json::from_str(r#"{"decision":"allow"}"#).unwrap();
        assert_eq!(v, WafVerdict::Allow);

        let v: WafVerdict =
            serde_json::from_str(r#"{"decision":"rate_limited","retry_after_secs":7}"#).unwrap();
        assert_eq!(v, WafVerdict::RateLimited { retry_after_secs: 7 });

        let v: WafVerdict =
            serde_json::from_str(r#"{"decision":"denied","category":"shield","subtype":"xss"}"#)
                .unwrap();
        assert_eq!(
            v,
            WafVerdict::Denied {
                category: DenyCategory::Shield,
                subtype: Some("xss".to_string()),
            }
        );
    }
}
