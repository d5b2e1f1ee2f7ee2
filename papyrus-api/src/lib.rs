//! Papyrus API - HTTP Server
//!
//! Axum server for the mini-program backend:
//! - Login exchange against the identity provider
//! - Profile reads and updates, with activation code linking
//! - Operator allocation of activation codes
//! - Cached paper answers, generated on first request
//!
//! Everything is wired once in `main` and shared through [`AppState`].

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
#[macro_use]
pub mod macros;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

pub use config::{ApiConfig, WechatConfig};
pub use db::{DbConfig, PgStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use identity::{IdentityProvider, IdentitySession, StaticIdentityProvider, WechatIdentityClient};
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use services::{AccountService, ActivationCodeAllocator, ActivationLinker, LinkOutcome};
pub use state::AppState;
pub use telemetry::{init_tracing, TelemetryConfig};
