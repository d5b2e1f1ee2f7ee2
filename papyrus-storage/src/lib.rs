//! Papyrus Storage - Store Trait, In-Memory Store and Answer Cache
//!
//! Defines the persistence contract every backend implements. The Postgres
//! implementation lives in papyrus-api; [`InMemoryStore`] backs tests and
//! local development.

pub mod cache;
pub mod memory;

pub use cache::{CacheConfig, PaperAnswerCache, SingleFlight};
pub use memory::InMemoryStore;

use async_trait::async_trait;
use papyrus_core::{
    AccessLog, Account, AccountId, AccountLogin, ActivationCode, ClaimOutcome, NewPaperAnswer,
    PaperAnswer, PaperKey, PapyrusResult, ProfileUpdate,
};

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Durable keyed storage for accounts, activation codes, cached answers and
/// access logs.
///
/// Unique constraints every implementation must enforce:
/// - `accounts.openid`
/// - `accounts.activation_code`
/// - `activation_codes.code`
/// - `paper_answers (school, paper_id)`
///
/// Inserts that hit a constraint return
/// [`StorageError::UniqueViolation`](papyrus_core::StorageError::UniqueViolation).
#[async_trait]
pub trait Store: Send + Sync {
    // === Account Operations ===

    /// Get an account by identity provider subject id.
    async fn account_get_by_openid(&self, openid: &str) -> PapyrusResult<Option<Account>>;

    /// Create the account on first login, or refresh its session fields.
    async fn account_upsert_login(&self, login: &AccountLogin) -> PapyrusResult<Account>;

    /// Apply non-empty display fields. Returns `None` if the account is unknown.
    ///
    /// The activation code field of the update is ignored here; binding a code
    /// goes through [`Store::activation_code_claim`].
    async fn account_update_profile(&self, update: &ProfileUpdate)
        -> PapyrusResult<Option<Account>>;

    // === Activation Code Operations ===

    /// Get a code row by value.
    async fn activation_code_get(&self, code: &str) -> PapyrusResult<Option<ActivationCode>>;

    /// Insert a new unowned code.
    async fn activation_code_insert(&self, code: &str) -> PapyrusResult<ActivationCode>;

    /// Get the code owned by an account, if any.
    async fn activation_code_find_by_owner(
        &self,
        owner: AccountId,
    ) -> PapyrusResult<Option<ActivationCode>>;

    /// Atomically bind an unowned code to an account.
    ///
    /// Inside one transaction: re-read the code's owner and the account's
    /// bound code, and only when both are free set `owner = account_id` and
    /// `account.activation_code = code`. Both writes commit together or not at
    /// all. Fails with `NotFound` when either row is missing.
    async fn activation_code_claim(
        &self,
        code: &str,
        account_id: AccountId,
    ) -> PapyrusResult<ClaimOutcome>;

    // === Paper Answer Operations ===

    /// Get the cached answer for a key.
    async fn paper_answer_get(&self, key: PaperKey) -> PapyrusResult<Option<PaperAnswer>>;

    /// Insert a generated answer. Never overwrites an existing row.
    async fn paper_answer_insert(&self, answer: &NewPaperAnswer) -> PapyrusResult<PaperAnswer>;

    // === Access Log ===

    async fn access_log_append(&self, log: &AccessLog) -> PapyrusResult<()>;

    // === Health ===

    /// Cheap round trip used by readiness checks.
    async fn ping(&self) -> PapyrusResult<()>;
}
