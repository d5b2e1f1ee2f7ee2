//! Papyrus API Server Entry Point
//!
//! Loads configuration, connects to PostgreSQL, wires the services and
//! starts the Axum HTTP server.

use std::sync::Arc;

use axum::Router;
use papyrus_api::{
    create_api_router, init_tracing, ApiConfig, ApiError, ApiResult, AppState, DbConfig, PgStore,
    TelemetryConfig, WechatConfig, WechatIdentityClient,
};
use papyrus_core::PapyrusError;
use papyrus_llm::{GeneratorConfig, HttpArtifactGenerator};
use papyrus_storage::CacheConfig;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let api_config = ApiConfig::from_env().map_err(PapyrusError::from)?;
    let db_config = DbConfig::from_env().map_err(PapyrusError::from)?;
    let wechat_config = WechatConfig::from_env().map_err(PapyrusError::from)?;
    let generator_config = GeneratorConfig::from_env().map_err(PapyrusError::from)?;

    let pool = db_config.create_pool()?;
    let store = PgStore::new(pool);
    store.migrate().await?;
    tracing::info!(host = %db_config.host, dbname = %db_config.dbname, "database ready");

    let cache_config = CacheConfig::new().with_generation_timeout(generator_config.timeout);
    let identity = WechatIdentityClient::new(wechat_config).map_err(PapyrusError::from)?;
    let generator = HttpArtifactGenerator::new(generator_config).map_err(PapyrusError::from)?;

    let state = AppState::new(
        Arc::new(store),
        Arc::new(identity),
        Arc::new(generator),
        &api_config,
        cache_config,
    );
    let app: Router = create_api_router(state, &api_config);

    let addr = api_config.bind_addr;
    tracing::info!(%addr, "Starting Papyrus API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
