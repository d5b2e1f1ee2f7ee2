//! Account Routes
//!
//! Login exchange and profile read/update for mini-program users.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use papyrus_core::{AccountProfile, ProfileUpdate};

use crate::error::{ApiError, ApiResult};
use crate::services::AccountService;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct LoginParams {
    /// One-time login code from the client SDK.
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct ProfileParams {
    pub openid: Option<String>,
}

/// Successful login exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LoginResponse {
    pub openid: String,
    pub session_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /wx-login - Exchange a login code and upsert the account
#[utoipa::path(
    get,
    path = "/wx-login",
    tag = "Accounts",
    params(LoginParams),
    responses(
        (status = 200, description = "Login succeeded", body = LoginResponse),
        (status = 400, description = "Missing code", body = ApiError),
        (status = 401, description = "Invalid secret", body = ApiError),
        (status = 502, description = "Identity provider failure", body = ApiError),
    ),
    security(("api_secret" = []))
)]
pub async fn login(
    State(accounts): State<AccountService>,
    Query(params): Query<LoginParams>,
) -> ApiResult<Json<LoginResponse>> {
    let code = params.code.unwrap_or_default();
    let account = accounts.login(&code).await?;
    Ok(Json(LoginResponse {
        openid: account.openid,
        session_key: account.session_key.unwrap_or_default(),
    }))
}

/// GET /wx-profile - Read a profile by openid
#[utoipa::path(
    get,
    path = "/wx-profile",
    tag = "Accounts",
    params(ProfileParams),
    responses(
        (status = 200, description = "Profile found", body = AccountProfile),
        (status = 400, description = "Missing openid", body = ApiError),
        (status = 404, description = "No such account", body = ApiError),
    ),
    security(("api_secret" = []))
)]
pub async fn get_profile(
    State(accounts): State<AccountService>,
    Query(params): Query<ProfileParams>,
) -> ApiResult<Json<AccountProfile>> {
    let openid = params.openid.unwrap_or_default();
    let profile = accounts.get_profile(&openid).await?;
    Ok(Json(profile))
}

/// POST /wx-profile - Update display fields and optionally link a code
#[utoipa::path(
    post,
    path = "/wx-profile",
    tag = "Accounts",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Profile updated", body = MessageResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 404, description = "No such account or code", body = ApiError),
        (status = 409, description = "Code already claimed", body = ApiError),
    ),
    security(("api_secret" = []))
)]
pub async fn update_profile(
    State(accounts): State<AccountService>,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(update) = payload.map_err(|e| ApiError::invalid_input(e.body_text()))?;
    accounts.update_profile(&update).await?;
    Ok(Json(MessageResponse {
        message: "Profile updated successfully".to_string(),
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/wx-login", get(login))
        .route("/wx-profile", get(get_profile).post(update_profile))
}
