//! Identity provider code exchange.
//!
//! A mini-program client obtains a short-lived `js_code` and hands it to us;
//! we trade it with the identity provider for the user's stable subject id
//! (`openid`) and a session key. Nothing else of the provider's protocol is
//! modelled here.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use papyrus_core::{AccountLogin, IdentityError};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::WechatConfig;

/// Identity established by a successful code exchange.
pub type IdentitySession = AccountLogin;

/// Trades a client-side login code for a subject id.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange(&self, js_code: &str) -> Result<IdentitySession, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct Code2SessionResponse {
    openid: Option<String>,
    session_key: Option<String>,
    unionid: Option<String>,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// `jscode2session` client.
pub struct WechatIdentityClient {
    client: Client,
    app_id: String,
    app_secret: SecretString,
    login_url: String,
}

impl WechatIdentityClient {
    pub fn new(config: WechatConfig) -> Result<Self, IdentityError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IdentityError::Transport {
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            app_id: config.app_id,
            app_secret: config.app_secret,
            login_url: config.login_url,
        })
    }

    /// Client for tests and local stubs.
    pub fn with_url(login_url: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            app_id: app_id.into(),
            app_secret: SecretString::from("test-secret".to_string()),
            login_url: login_url.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for WechatIdentityClient {
    async fn exchange(&self, js_code: &str) -> Result<IdentitySession, IdentityError> {
        let response = self
            .client
            .get(&self.login_url)
            .query(&[
                ("appid", self.app_id.as_str()),
                ("secret", self.app_secret.expose_secret()),
                ("js_code", js_code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| IdentityError::Transport {
                reason: format!("HTTP request failed: {}", e.without_url()),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::RequestFailed {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: Code2SessionResponse =
            response
                .json()
                .await
                .map_err(|e| IdentityError::InvalidResponse {
                    reason: format!("failed to parse response: {}", e.without_url()),
                })?;

        if body.errcode != 0 {
            return Err(IdentityError::InvalidResponse {
                reason: format!("errcode {}: {}", body.errcode, body.errmsg),
            });
        }

        match (body.openid, body.session_key) {
            (Some(openid), Some(session_key)) if !openid.is_empty() => {
                tracing::debug!(%openid, has_unionid = body.unionid.is_some(), "identity exchanged");
                Ok(IdentitySession {
                    openid,
                    unionid: body.unionid,
                    session_key,
                })
            }
            _ => Err(IdentityError::InvalidResponse {
                reason: "response lacks openid or session_key".to_string(),
            }),
        }
    }
}

/// In-process provider that answers from a fixed table of codes.
///
/// Used by tests and local runs without identity provider credentials.
/// Unknown codes fail the way the real provider does for an expired code.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    sessions: Arc<DashMap<String, IdentitySession>>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `js_code` as resolving to `openid`.
    pub fn with_code(self, js_code: &str, openid: &str) -> Self {
        self.sessions.insert(
            js_code.to_string(),
            IdentitySession {
                openid: openid.to_string(),
                unionid: None,
                session_key: format!("session-{}", js_code),
            },
        );
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn exchange(&self, js_code: &str) -> Result<IdentitySession, IdentityError> {
        self.sessions
            .get(js_code)
            .map(|s| s.value().clone())
            .ok_or_else(|| IdentityError::InvalidResponse {
                reason: "errcode 40029: invalid code".to_string(),
            })
    }
}

impl std::fmt::Debug for WechatIdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WechatIdentityClient")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("login_url", &self.login_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    async fn code2session(
        Query(params): Query<HashMap<String, String>>,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        if params.get("grant_type").map(String::as_str) != Some("authorization_code") {
            return Err(StatusCode::BAD_REQUEST);
        }
        let body = match params.get("js_code").map(String::as_str) {
            Some("good") => serde_json::json!({
                "openid": "o-123",
                "session_key": "sk-abc",
                "unionid": "u-9",
            }),
            Some("no-union") => serde_json::json!({
                "openid": "o-456",
                "session_key": "sk-def",
            }),
            Some("partial") => serde_json::json!({ "openid": "o-789" }),
            _ => serde_json::json!({ "errcode": 40029, "errmsg": "invalid code" }),
        };
        Ok(Json(body))
    }

    async fn serve_stub() -> String {
        let app = Router::new()
            .route("/sns/jscode2session", get(code2session))
            .route("/down", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_exchange_success() {
        let base = serve_stub().await;
        let client = WechatIdentityClient::with_url(format!("{}/sns/jscode2session", base), "wx1");

        let session = client.exchange("good").await.unwrap();
        assert_eq!(session.openid, "o-123");
        assert_eq!(session.session_key, "sk-abc");
        assert_eq!(session.unionid.as_deref(), Some("u-9"));

        let session = client.exchange("no-union").await.unwrap();
        assert!(session.unionid.is_none());
    }

    #[tokio::test]
    async fn test_exchange_rejects_incomplete_body() {
        let base = serve_stub().await;
        let client = WechatIdentityClient::with_url(format!("{}/sns/jscode2session", base), "wx1");

        let err = client.exchange("partial").await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidResponse { .. }));

        let err = client.exchange("expired").await.unwrap_err();
        assert!(
            matches!(err, IdentityError::InvalidResponse { ref reason } if reason.contains("40029"))
        );
    }

    #[tokio::test]
    async fn test_exchange_non_success_status() {
        let base = serve_stub().await;
        let client = WechatIdentityClient::with_url(format!("{}/down", base), "wx1");

        let err = client.exchange("good").await.unwrap_err();
        assert!(matches!(err, IdentityError::RequestFailed { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticIdentityProvider::new().with_code("c1", "o-1");

        let session = provider.exchange("c1").await.unwrap();
        assert_eq!(session.openid, "o-1");
        assert_eq!(session.session_key, "session-c1");
        assert!(provider.exchange("c2").await.is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let client = WechatIdentityClient::with_url("http://localhost/x", "wx1");
        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("test-secret"));
    }
}
