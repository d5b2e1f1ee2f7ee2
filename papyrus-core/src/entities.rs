//! Persisted entities and validated keys.

use crate::{AccountId, EntityId, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// PAPER KEY
// ============================================================================

/// Composite cache key for a generated paper answer.
///
/// Both components are positive integers supplied by the caller. Construction
/// goes through [`PaperKey::new`], so a key that exists is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaperKey {
    school: i64,
    paper: i64,
}

impl PaperKey {
    pub fn new(school: i64, paper: i64) -> Result<Self, ValidationError> {
        if school <= 0 {
            return Err(ValidationError::InvalidValue {
                field: "school".to_string(),
                reason: format!("must be a positive integer, got {}", school),
            });
        }
        if paper <= 0 {
            return Err(ValidationError::InvalidValue {
                field: "paper_id".to_string(),
                reason: format!("must be a positive integer, got {}", paper),
            });
        }
        Ok(Self { school, paper })
    }

    pub fn school(&self) -> i64 {
        self.school
    }

    pub fn paper(&self) -> i64 {
        self.paper
    }
}

impl fmt::Display for PaperKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.school, self.paper)
    }
}

// ============================================================================
// PAPER ANSWER
// ============================================================================

/// A generated question/answer pair, cached per `(school, paper)`.
///
/// Once written a row is never overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PaperAnswer {
    pub school: i64,
    pub paper_id: i64,
    /// Prompt content (the paper text).
    pub question: String,
    /// Generated answer content.
    pub answer: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl PaperAnswer {
    pub fn key(&self) -> PaperKey {
        PaperKey {
            school: self.school,
            paper: self.paper_id,
        }
    }
}

/// Insert payload for a freshly generated answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaperAnswer {
    pub key: PaperKey,
    pub question: String,
    pub answer: String,
}

// ============================================================================
// ACCOUNT
// ============================================================================

/// An end-user account, created on the first successful identity exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    /// Identity provider subject id. Unique and stable.
    pub openid: String,
    pub unionid: Option<String>,
    pub session_key: Option<String>,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub realname: Option<String>,
    pub mobile: Option<String>,
    /// Activation code bound to this account, if any.
    pub activation_code: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Account {
    pub fn profile(&self) -> AccountProfile {
        AccountProfile {
            openid: self.openid.clone(),
            nickname: self.nickname.clone().unwrap_or_default(),
            avatar_url: self.avatar_url.clone().unwrap_or_default(),
            realname: self.realname.clone().unwrap_or_default(),
            activate_code: self.activation_code.clone().unwrap_or_default(),
        }
    }
}

/// Result of an identity exchange, used to create or refresh an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLogin {
    pub openid: String,
    pub unionid: Option<String>,
    pub session_key: String,
}

/// Public profile view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AccountProfile {
    pub openid: String,
    pub nickname: String,
    pub avatar_url: String,
    pub realname: String,
    pub activate_code: String,
}

/// Display-field update. Empty or missing values leave the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProfileUpdate {
    pub openid: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub realname: Option<String>,
    #[serde(default)]
    pub activate_code: Option<String>,
}

impl ProfileUpdate {
    /// Value of a field when it carries something to write.
    pub fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn activation_code(&self) -> Option<&str> {
        Self::non_empty(&self.activate_code)
    }
}

// ============================================================================
// ACTIVATION CODE
// ============================================================================

/// Characters a code is drawn from.
pub const ACTIVATION_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Fixed code length.
pub const ACTIVATION_CODE_LEN: usize = 4;

/// A one-time activation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationCode {
    pub code: String,
    /// Owning account. Transitions from `None` to `Some` at most once.
    pub owner: Option<AccountId>,
    pub created_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
}

impl ActivationCode {
    pub fn unowned(code: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            code: code.into(),
            owner: None,
            created_at,
            claimed_at: None,
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.owner.is_some()
    }

    /// Trim and uppercase a user-supplied code, then check its shape.
    pub fn normalize(raw: &str) -> Result<String, ValidationError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "activate_code".to_string(),
            });
        }
        let well_formed = code.len() == ACTIVATION_CODE_LEN
            && code.bytes().all(|b| ACTIVATION_CODE_ALPHABET.contains(&b));
        if !well_formed {
            return Err(ValidationError::InvalidValue {
                field: "activate_code".to_string(),
                reason: format!(
                    "expected {} characters from A-Z and 0-9",
                    ACTIVATION_CODE_LEN
                ),
            });
        }
        Ok(code)
    }
}

/// Result of the atomic claim step on the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The code was unowned and now belongs to the requesting account.
    Claimed(ActivationCode),
    /// The code already had an owner when the transaction looked at it.
    AlreadyOwned { owner: AccountId },
    /// The account is already bound to a different code.
    AccountBound { bound_code: String },
}

// ============================================================================
// ACCESS LOG
// ============================================================================

/// Best-effort record of an account reading a cached artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLog {
    pub log_id: EntityId,
    pub account_id: AccountId,
    pub action: String,
    pub detail: serde_json::Value,
    pub created_at: Timestamp,
}

impl AccessLog {
    pub const PAPER_ANSWERS: &'static str = "get_paper_answers";

    pub fn paper_lookup(account_id: AccountId, key: PaperKey) -> Self {
        Self {
            log_id: crate::new_entity_id(),
            account_id,
            action: Self::PAPER_ANSWERS.to_string(),
            detail: serde_json::json!({
                "school": key.school(),
                "paper_id": key.paper(),
            }),
            created_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_paper_key_rejects_non_positive() {
        assert!(PaperKey::new(0, 1).is_err());
        assert!(PaperKey::new(1, 0).is_err());
        assert!(PaperKey::new(-7, 101).is_err());
        let key = PaperKey::new(7, 101).unwrap();
        assert_eq!(key.school(), 7);
        assert_eq!(key.paper(), 101);
        assert_eq!(key.to_string(), "7/101");
    }

    #[test]
    fn test_paper_key_error_names_field() {
        match PaperKey::new(3, -1) {
            Err(ValidationError::InvalidValue { field, .. }) => assert_eq!(field, "paper_id"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(ActivationCode::normalize(" ab12 ").unwrap(), "AB12");
        assert!(matches!(
            ActivationCode::normalize("   "),
            Err(ValidationError::RequiredFieldMissing { .. })
        ));
        assert!(ActivationCode::normalize("AB1").is_err());
        assert!(ActivationCode::normalize("AB-2").is_err());
        assert!(ActivationCode::normalize("ÄB12").is_err());
    }

    #[test]
    fn test_profile_update_non_empty() {
        let update = ProfileUpdate {
            openid: "o-1".to_string(),
            nickname: Some("  ".to_string()),
            activate_code: Some("AB12".to_string()),
            ..Default::default()
        };
        assert_eq!(ProfileUpdate::non_empty(&update.nickname), None);
        assert_eq!(update.activation_code(), Some("AB12"));
    }

    #[test]
    fn test_access_log_detail() {
        let key = PaperKey::new(7, 101).unwrap();
        let log = AccessLog::paper_lookup(AccountId::now_v7(), key);
        assert_eq!(log.action, "get_paper_answers");
        assert_eq!(log.detail["school"], 7);
        assert_eq!(log.detail["paper_id"], 101);
    }

    proptest! {
        #[test]
        fn prop_positive_pairs_always_valid(school in 1i64..i64::MAX, paper in 1i64..i64::MAX) {
            let key = PaperKey::new(school, paper).unwrap();
            prop_assert_eq!((key.school(), key.paper()), (school, paper));
        }

        #[test]
        fn prop_generated_shape_normalizes_to_itself(code in "[A-Z0-9]{4}") {
            prop_assert_eq!(ActivationCode::normalize(&code).unwrap(), code);
        }
    }
}
