//! Paper Answer Routes
//!
//! Lookups go through the answer cache. When the caller identifies itself
//! with an openid the account must be activated first, and the lookup is
//! recorded against it.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use papyrus_core::{PaperKey, PapyrusError, ValidationError};
use papyrus_storage::PaperAnswerCache;

use crate::error::{ApiError, ApiResult};
use crate::services::AccountService;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Raw query parameters. Numbers are parsed by hand so a bad value reads as
/// a validation error rather than an extractor rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct PaperAnswerParams {
    /// School identifier (positive integer).
    pub school: Option<String>,
    /// Paper identifier within the school (positive integer).
    pub paper_id: Option<String>,
    /// Requesting account. Optional, enables the activation gate.
    pub openid: Option<String>,
}

impl PaperAnswerParams {
    /// Validate into a key before any I/O happens.
    pub fn key(&self) -> Result<PaperKey, ApiError> {
        let school = parse_id("school", self.school.as_deref())?;
        let paper = parse_id("paper_id", self.paper_id.as_deref())?;
        Ok(PaperKey::new(school, paper).map_err(PapyrusError::from)?)
    }

    fn openid(&self) -> Option<&str> {
        self.openid
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
    }
}

fn parse_id(field: &str, raw: Option<&str>) -> Result<i64, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Err(ApiError::missing_field(field));
    };
    raw.parse::<i64>().map_err(|_| {
        PapyrusError::from(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("expected an integer, got {:?}", raw),
        })
        .into()
    })
}

/// Cached answer in the shape the client expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PaperAnswerResponse {
    pub school: i64,
    pub paper_id: i64,
    /// Question text.
    pub q: String,
    /// Answer text.
    pub a: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /paper_answers - Fetch or generate the answer for a paper
#[utoipa::path(
    get,
    path = "/paper_answers",
    tag = "Papers",
    params(PaperAnswerParams),
    responses(
        (status = 200, description = "Answer found or generated", body = PaperAnswerResponse),
        (status = 400, description = "Invalid school or paper_id", body = ApiError),
        (status = 403, description = "Account not activated", body = ApiError),
        (status = 404, description = "No such account", body = ApiError),
        (status = 502, description = "Generator failure", body = ApiError),
        (status = 504, description = "Generator timed out", body = ApiError),
    ),
    security(("api_secret" = []))
)]
pub async fn get_paper_answers(
    State(accounts): State<AccountService>,
    State(answers): State<PaperAnswerCache>,
    Query(params): Query<PaperAnswerParams>,
) -> ApiResult<Json<PaperAnswerResponse>> {
    let key = params.key()?;

    let requester = match params.openid() {
        Some(openid) => Some(accounts.require_activated(openid).await?.account_id),
        None => None,
    };

    let answer = answers.get_or_create(key, requester).await?;
    Ok(Json(PaperAnswerResponse {
        school: answer.school,
        paper_id: answer.paper_id,
        q: answer.question,
        a: answer.answer,
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/paper_answers", get(get_paper_answers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use papyrus_test_utils::generators;
    use proptest::prelude::*;

    fn params(school: Option<&str>, paper: Option<&str>) -> PaperAnswerParams {
        PaperAnswerParams {
            school: school.map(str::to_string),
            paper_id: paper.map(str::to_string),
            openid: None,
        }
    }

    #[test]
    fn test_valid_key() {
        let key = params(Some("7"), Some(" 101 ")).key().unwrap();
        assert_eq!((key.school(), key.paper()), (7, 101));
    }

    #[test]
    fn test_missing_fields() {
        let err = params(None, Some("1")).key().unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingField);
        let err = params(Some("1"), Some("  ")).key().unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingField);
    }

    #[test]
    fn test_non_numeric() {
        let err = params(Some("seven"), Some("1")).key().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert!(err.message.contains("school"));
    }

    #[test]
    fn test_blank_openid_is_anonymous() {
        let mut p = params(Some("1"), Some("1"));
        p.openid = Some("   ".to_string());
        assert_eq!(p.openid(), None);
        p.openid = Some(" o-1 ".to_string());
        assert_eq!(p.openid(), Some("o-1"));
    }

    proptest! {
        #[test]
        fn prop_non_positive_rejected((school, paper) in generators::arb_invalid_key_parts()) {
            let err = params(Some(&school.to_string()), Some(&paper.to_string()))
                .key()
                .unwrap_err();
            prop_assert_eq!(err.code, ErrorCode::InvalidInput);
        }

        #[test]
        fn prop_positive_accepted(school in 1i64..i64::MAX, paper in 1i64..i64::MAX) {
            let key = params(Some(&school.to_string()), Some(&paper.to_string()))
                .key()
                .unwrap();
            prop_assert_eq!((key.school(), key.paper()), (school, paper));
        }
    }
}
