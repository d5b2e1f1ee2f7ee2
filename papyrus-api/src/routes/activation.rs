//! Activation Code Routes
//!
//! Allocation is an operator action guarded by its own secret.

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::services::ActivationCodeAllocator;
use crate::state::AppState;

/// Freshly allocated code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ActivationCodeResponse {
    pub data: String,
}

/// GET /activate_code - Allocate a new unowned activation code
#[utoipa::path(
    get,
    path = "/activate_code",
    tag = "Activation",
    responses(
        (status = 200, description = "Code allocated", body = ActivationCodeResponse),
        (status = 401, description = "Invalid activation secret", body = ApiError),
        (status = 500, description = "Code space exhausted", body = ApiError),
    ),
    security(("activation_secret" = []))
)]
pub async fn allocate_code(
    State(allocator): State<ActivationCodeAllocator>,
) -> ApiResult<Json<ActivationCodeResponse>> {
    let code = allocator.allocate().await?;
    Ok(Json(ActivationCodeResponse { data: code.code }))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/activate_code", get(allocate_code))
}
