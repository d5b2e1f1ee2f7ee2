//! Error types for Papyrus operations

use crate::{AccountId, EntityType};
use std::time::Duration;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type} with key {key}")]
    NotFound { entity_type: EntityType, key: String },

    /// A unique constraint rejected an insert. Callers that race on the same
    /// key treat this as "someone else won" rather than as a failure.
    #[error("Unique constraint violated for {entity_type}: {key}")]
    UniqueViolation { entity_type: EntityType, key: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}

/// Remote artifact generator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("Generator request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Generator did not answer within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Invalid generator response: {reason}")]
    InvalidResponse { reason: String },

    #[error("Generator transport error: {reason}")]
    Transport { reason: String },

    #[error("Generation aborted: {reason}")]
    Aborted { reason: String },
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Activation code business errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActivationError {
    #[error("Activation code {code} does not exist")]
    UnknownCode { code: String },

    #[error("Activation code {code} is already claimed by another account")]
    CodeAlreadyClaimed { code: String },

    #[error("Account {account_id} is already activated with code {bound_code}")]
    AccountAlreadyActivated {
        account_id: AccountId,
        bound_code: String,
    },

    #[error("Account {openid} is not activated")]
    AccountNotActivated { openid: String },

    #[error("No free activation code found after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },
}

/// Identity provider exchange errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Identity exchange failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Invalid identity response: {reason}")]
    InvalidResponse { reason: String },

    #[error("Identity transport error: {reason}")]
    Transport { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Papyrus errors.
#[derive(Debug, Clone, Error)]
pub enum PapyrusError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Activation error: {0}")]
    Activation(#[from] ActivationError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Papyrus operations.
pub type PapyrusResult<T> = Result<T, PapyrusError>;

/// Coarse error category used by callers to decide on retries and by the
/// HTTP layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Forbidden,
    UpstreamFailure,
    StoreFailure,
    Internal,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamFailure | Self::StoreFailure)
    }
}

impl PapyrusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(StorageError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Storage(StorageError::UniqueViolation { .. }) => ErrorKind::Conflict,
            Self::Storage(_) => ErrorKind::StoreFailure,
            Self::Generator(_) | Self::Identity(_) => ErrorKind::UpstreamFailure,
            Self::Validation(_) => ErrorKind::InvalidInput,
            Self::Activation(err) => match err {
                ActivationError::UnknownCode { .. } => ErrorKind::NotFound,
                ActivationError::CodeAlreadyClaimed { .. }
                | ActivationError::AccountAlreadyActivated { .. } => ErrorKind::Conflict,
                ActivationError::AccountNotActivated { .. } => ErrorKind::Forbidden,
                ActivationError::CodeSpaceExhausted { .. } => ErrorKind::Internal,
            },
            Self::Config(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Shorthand for an account lookup miss keyed by subject id.
    pub fn account_not_found(openid: &str) -> Self {
        Self::Storage(StorageError::NotFound {
            entity_type: EntityType::Account,
            key: openid.to_string(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_unique_violation() {
        let err = StorageError::UniqueViolation {
            entity_type: EntityType::ActivationCode,
            key: "AB12".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("activation_code"));
        assert!(msg.contains("AB12"));
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_kind_mapping() {
        let unknown: PapyrusError = ActivationError::UnknownCode {
            code: "ZZZZ".to_string(),
        }
        .into();
        assert_eq!(unknown.kind(), ErrorKind::NotFound);

        let claimed: PapyrusError = ActivationError::CodeAlreadyClaimed {
            code: "AB12".to_string(),
        }
        .into();
        assert_eq!(claimed.kind(), ErrorKind::Conflict);

        let upstream: PapyrusError = GeneratorError::Timeout {
            timeout: Duration::from_secs(600),
        }
        .into();
        assert_eq!(upstream.kind(), ErrorKind::UpstreamFailure);
        assert!(upstream.is_retryable());

        let store: PapyrusError = StorageError::Unavailable {
            reason: "pool closed".to_string(),
        }
        .into();
        assert_eq!(store.kind(), ErrorKind::StoreFailure);
        assert!(store.is_retryable());

        let invalid: PapyrusError = ValidationError::InvalidValue {
            field: "school".to_string(),
            reason: "must be positive".to_string(),
        }
        .into();
        assert_eq!(invalid.kind(), ErrorKind::InvalidInput);
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn test_account_not_found_is_not_found() {
        let err = PapyrusError::account_not_found("o-123");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("o-123"));
    }

    #[test]
    fn test_exhaustion_is_not_retryable() {
        let err: PapyrusError = ActivationError::CodeSpaceExhausted { attempts: 64 }.into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.is_retryable());
    }
}
