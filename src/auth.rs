//! Identity provider boundary and admin session guard
//!
//! The hosted identity provider only proves who the caller is. Whether
//! they are still an admin is decided here, against the users table, on
//! every privileged call: roles change and accounts get deleted without
//! the provider's session noticing.

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::AuthConfig;
use crate::db::{Database, User};

/// Identity claims as verified by the provider. Captured, not trusted for
/// authorization.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionClaims {
    pub user_id: String,
    pub email: String,
}

/// Why a privileged call was refused. Claims are carried along when the
/// identity itself verified, so the caller can attribute its audit entry.
#[derive(Debug)]
pub enum AuthFailure {
    /// No token, or the provider rejected it.
    NotAuthenticated,
    /// Identity verified but the system of record says not-an-admin
    /// (role changed, or the user row is gone).
    NotAdmin(SessionClaims),
}

impl AuthFailure {
    pub fn claims(&self) -> Option<&SessionClaims> {
        match self {
            AuthFailure::NotAuthenticated => None,
            AuthFailure::NotAdmin(claims) => Some(claims),
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify a bearer token. `Ok(None)` means the provider rejected it;
    /// transport failures also resolve to None so an identity outage
    /// reads as "not authenticated", never as "authenticated".
    async fn verify(&self, token: &str) -> Option<SessionClaims>;
}

/// Hosted identity provider reached over its verify endpoint.
pub struct RemoteIdentityProvider {
    http: reqwest::Client,
    verify_url: String,
}

impl RemoteIdentityProvider {
    pub fn new(config: &AuthConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        if config.verify_url.is_empty() {
            info!("Identity provider disabled (no verify_url) - privileged calls will be denied");
        } else {
            info!("Identity provider at {}", config.verify_url);
        }
        Self {
            http,
            verify_url: config.verify_url.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentityProvider {
    async fn verify(&self, token: &str) -> Option<SessionClaims> {
        if self.verify_url.is_empty() {
            return None;
        }
        let response = match self
            .http
            .get(&self.verify_url)
            .bearer_auth(token)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!("Identity verification failed: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            return None;
        }
        response.json::<SessionClaims>().await.ok()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Validate that the caller's claimed identity currently maps to an admin
/// in the system of record. Validation only: audit entries for denials
/// are the caller's responsibility.
pub async fn require_admin(
    identity: &dyn IdentityProvider,
    db: &Database,
    headers: &HeaderMap,
) -> Result<User, AuthFailure> {
    let Some(token) = bearer_token(headers) else {
        return Err(AuthFailure::NotAuthenticated);
    };
    let Some(claims) = identity.verify(token).await else {
        return Err(AuthFailure::NotAuthenticated);
    };

    // Fresh role check; the provider session alone is not sufficient.
    let user = match db.find_user_by_id(&claims.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(AuthFailure::NotAdmin(claims)),
        Err(e) => {
            debug!("Role lookup failed: {}", e);
            return Err(AuthFailure::NotAdmin(claims));
        }
    };
    if user.role != "admin" {
        return Err(AuthFailure::NotAdmin(claims));
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider(Option<SessionClaims>);

    #[async_trait]
    impl IdentityProvider for StaticProvider {
        async fn verify(&self, _token: &str) -> Option<SessionClaims> {
            self.0.clone()
        }
    }

    fn headers_with_token() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer test-token".parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn missing_token_is_not_authenticated() {
        let db = Database::in_memory().await.unwrap();
        let provider = StaticProvider(Some(SessionClaims {
            user_id: "u1".into(),
            email: "a@example.com".into(),
        }));
        let err = require_admin(&provider, &db, &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthFailure::NotAuthenticated));
    }

    #[tokio::test]
    async fn valid_session_without_admin_role_is_denied_with_claims() {
        let db = Database::in_memory().await.unwrap();
        db.upsert_user("u1", "a@example.com", "user").await.unwrap();
        let provider = StaticProvider(Some(SessionClaims {
            user_id: "u1".into(),
            email: "a@example.com".into(),
        }));
        let err = require_admin(&provider, &db, &headers_with_token())
            .await
            .unwrap_err();
        let claims = err.claims().expect("claims should be attached");
        assert_eq!(claims.user_id, "u1");
    }

    #[tokio::test]
    async fn deleted_user_is_denied_despite_valid_session() {
        let db = Database::in_memory().await.unwrap();
        let provider = StaticProvider(Some(SessionClaims {
            user_id: "ghost".into(),
            email: "ghost@example.com".into(),
        }));
        let err = require_admin(&provider, &db, &headers_with_token())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthFailure::NotAdmin(_)));
    }

    #[tokio::test]
    async fn current_admin_passes() {
        let db = Database::in_memory().await.unwrap();
        db.upsert_user("u1", "a@example.com", "admin").await.unwrap();
        let provider = StaticProvider(Some(SessionClaims {
            user_id: "u1".into(),
            email: "a@example.com".into(),
        }));
        let user = require_admin(&provider, &db, &headers_with_token())
            .await
            .unwrap();
        assert_eq!(user.role, "admin");
    }
}
