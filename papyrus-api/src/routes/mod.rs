//! REST API Routes
//!
//! Route table:
//! - `/wx-login`, `/wx-profile`, `/paper_answers` behind the API secret
//! - `/activate_code` behind the activation secret
//! - `/health/*` and `/openapi.json` open
//!
//! Every response passes through request tracing and gzip compression.

use axum::{middleware::from_fn_with_state, response::IntoResponse, routing::get, Json, Router};
use tower_http::{
    compression::{predicate::SizeAbove, CompressionLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::middleware::{require_secret, SecretGate};
use crate::openapi::ApiDoc;
use crate::state::AppState;

pub mod account;
pub mod activation;
pub mod health;
pub mod paper;

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

/// Handler for /openapi.json endpoint.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ============================================================================
// ROUTER ASSEMBLY
// ============================================================================

/// Build the full application router.
///
/// Layers, outermost first:
/// 1. Request tracing
/// 2. Gzip compression above `compression_min_bytes`
/// 3. Secret gate (per route group)
pub fn create_api_router(state: AppState, config: &ApiConfig) -> Router {
    let api_gate = SecretGate::new("api", &config.api_secret);
    let activation_gate = SecretGate::new("activation", &config.activation_secret);

    let business = Router::new()
        .merge(account::create_router())
        .merge(paper::create_router())
        .route_layer(from_fn_with_state(api_gate, require_secret));

    let activation = activation::create_router()
        .route_layer(from_fn_with_state(activation_gate, require_secret));

    Router::new()
        .merge(business)
        .merge(activation)
        .nest("/health", health::create_router())
        .route("/openapi.json", get(openapi_json))
        .with_state(state)
        .layer(
            CompressionLayer::new().compress_when(SizeAbove::new(config.compression_min_bytes)),
        )
        .layer(TraceLayer::new_for_http())
}
