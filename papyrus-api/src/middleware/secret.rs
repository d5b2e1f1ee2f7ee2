//! Shared-Secret Middleware
//!
//! Every business route is guarded by a static secret supplied either as the
//! `sec` query parameter (what the mini-program client sends) or as the
//! `x-api-secret` header. Missing or wrong secrets get a 401 before the
//! handler runs.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::error::ApiError;

/// Header alternative to the `sec` query parameter.
pub const SECRET_HEADER: &str = "x-api-secret";

/// Query parameter carrying the secret.
pub const SECRET_QUERY_PARAM: &str = "sec";

/// State for [`require_secret`]. One instance per distinct secret.
#[derive(Clone)]
pub struct SecretGate {
    name: &'static str,
    expected: Arc<SecretString>,
}

impl SecretGate {
    /// `name` only appears in logs.
    pub fn new(name: &'static str, expected: &SecretString) -> Self {
        Self {
            name,
            expected: Arc::new(SecretString::from(expected.expose_secret().to_string())),
        }
    }

    /// Check a presented secret. An empty expected secret matches nothing.
    pub fn accepts(&self, presented: &str) -> bool {
        let expected = self.expected.expose_secret().as_bytes();
        if expected.is_empty() {
            return false;
        }
        bool::from(expected.ct_eq(presented.as_bytes()))
    }
}

impl std::fmt::Debug for SecretGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretGate")
            .field("name", &self.name)
            .field("expected", &"[REDACTED]")
            .finish()
    }
}

/// Pull the presented secret from the request, header first.
fn presented_secret(request: &Request) -> Option<String> {
    if let Some(value) = request
        .headers()
        .get(SECRET_HEADER)
        .and_then(|h| h.to_str().ok())
    {
        return Some(value.to_string());
    }

    Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(mut params)| params.remove(SECRET_QUERY_PARAM))
}

/// Reject requests that do not carry the gate's secret.
///
/// ```ignore
/// let router = Router::new()
///     .route("/wx-profile", get(get_profile))
///     .layer(middleware::from_fn_with_state(gate, require_secret));
/// ```
pub async fn require_secret(
    State(gate): State<SecretGate>,
    request: Request,
    next: Next,
) -> Response {
    match presented_secret(&request) {
        Some(secret) if gate.accepts(&secret) => next.run(request).await,
        Some(_) => {
            tracing::warn!(gate = gate.name, path = %request.uri().path(), "wrong secret");
            ApiError::unauthorized("Invalid secret key").into_response()
        }
        None => {
            tracing::debug!(gate = gate.name, path = %request.uri().path(), "missing secret");
            ApiError::unauthorized("Missing secret key").into_response()
        }
    }
}
